use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    Booking, BookingStatus, CreditTransaction, MediationMessage, Role, ServiceOffering,
    ServiceSnapshot, TransactionKind, TransactionStatus, User,
};

// ── Users ──

pub fn create_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, role, time_credits, held_credits, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id,
            user.name,
            user.role.as_str(),
            user.time_credits,
            user.held_credits,
            fmt_ts(&user.created_at),
            fmt_ts(&user.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, name, role, time_credits, held_credits, created_at, updated_at
         FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                role: Role::parse(&row.get::<_, String>(2)?),
                time_credits: row.get(3)?,
                held_credits: row.get(4)?,
                created_at: parse_ts(&row.get::<_, String>(5)?),
                updated_at: parse_ts(&row.get::<_, String>(6)?),
            })
        },
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_admin_ids(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM users WHERE role = 'admin' ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut ids = vec![];
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

// ── Services ──

pub fn create_service(conn: &Connection, service: &ServiceOffering) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, provider_id, title, description, duration_minutes, credits, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            service.id,
            service.provider_id,
            service.title,
            service.description,
            service.duration_minutes,
            service.credits,
            service.active as i32,
            fmt_ts(&service.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<ServiceOffering>> {
    let result = conn.query_row(
        "SELECT id, provider_id, title, description, duration_minutes, credits, active, created_at
         FROM services WHERE id = ?1",
        params![id],
        |row| {
            Ok(ServiceOffering {
                id: row.get(0)?,
                provider_id: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                duration_minutes: row.get(4)?,
                credits: row.get(5)?,
                active: row.get::<_, i32>(6)? != 0,
                created_at: parse_ts(&row.get::<_, String>(7)?),
            })
        },
    );

    match result {
        Ok(service) => Ok(Some(service)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, service_id, requester_id, provider_id, status, held_credits, \
     service_snapshot, schedule_date, scheduled_duration_minutes, actual_duration_minutes, \
     proposed_credits, completion_notes, confirmed_by_provider, confirmed_by_requester, \
     dispute_reason, mediation_requested_by, mediation_requested_at, mediation_additional_info, \
     mediation_resolved_by, mediation_resolved_at, mediation_decision, final_credits, \
     credit_transferred, version, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let snapshot = serde_json::to_string(&booking.service_snapshot)
        .context("failed to serialize service snapshot")?;

    conn.execute(
        "INSERT INTO bookings (id, service_id, requester_id, provider_id, status, held_credits,
            service_snapshot, schedule_date, scheduled_duration_minutes, actual_duration_minutes,
            proposed_credits, completion_notes, confirmed_by_provider, confirmed_by_requester,
            dispute_reason, mediation_requested_by, mediation_requested_at, mediation_additional_info,
            mediation_resolved_by, mediation_resolved_at, mediation_decision, final_credits,
            credit_transferred, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
        params![
            booking.id,
            booking.service_id,
            booking.requester_id,
            booking.provider_id,
            booking.status.as_str(),
            booking.held_credits,
            snapshot,
            booking.schedule_date.as_ref().map(fmt_ts),
            booking.scheduled_duration_minutes,
            booking.actual_duration_minutes,
            booking.proposed_credits,
            booking.completion_notes,
            booking.confirmed_by_provider as i32,
            booking.confirmed_by_requester as i32,
            booking.dispute_reason,
            booking.mediation_requested_by,
            booking.mediation_requested_at.as_ref().map(fmt_ts),
            booking.mediation_additional_info,
            booking.mediation_resolved_by,
            booking.mediation_resolved_at.as_ref().map(fmt_ts),
            booking.mediation_decision,
            booking.final_credits,
            booking.credit_transferred as i32,
            booking.version,
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write every mutable booking field, guarded by the optimistic version
/// token. Returns false (and writes nothing) if a concurrent update won;
/// on success the in-memory version and updated_at are advanced to match.
pub fn save_booking(
    conn: &Connection,
    booking: &mut Booking,
    expected_version: i64,
) -> anyhow::Result<bool> {
    let now = Utc::now().naive_utc();
    let count = conn.execute(
        "UPDATE bookings SET
            status = ?1,
            schedule_date = ?2,
            scheduled_duration_minutes = ?3,
            actual_duration_minutes = ?4,
            proposed_credits = ?5,
            completion_notes = ?6,
            confirmed_by_provider = ?7,
            confirmed_by_requester = ?8,
            dispute_reason = ?9,
            mediation_requested_by = ?10,
            mediation_requested_at = ?11,
            mediation_additional_info = ?12,
            mediation_resolved_by = ?13,
            mediation_resolved_at = ?14,
            mediation_decision = ?15,
            final_credits = ?16,
            credit_transferred = ?17,
            version = ?18 + 1,
            updated_at = ?19
         WHERE id = ?20 AND version = ?18",
        params![
            booking.status.as_str(),
            booking.schedule_date.as_ref().map(fmt_ts),
            booking.scheduled_duration_minutes,
            booking.actual_duration_minutes,
            booking.proposed_credits,
            booking.completion_notes,
            booking.confirmed_by_provider as i32,
            booking.confirmed_by_requester as i32,
            booking.dispute_reason,
            booking.mediation_requested_by,
            booking.mediation_requested_at.as_ref().map(fmt_ts),
            booking.mediation_additional_info,
            booking.mediation_resolved_by,
            booking.mediation_resolved_at.as_ref().map(fmt_ts),
            booking.mediation_decision,
            booking.final_credits,
            booking.credit_transferred as i32,
            expected_version,
            fmt_ts(&now),
            booking.id,
        ],
    )?;

    if count == 0 {
        return Ok(false);
    }
    booking.version = expected_version + 1;
    booking.updated_at = now;
    Ok(true)
}

pub fn has_open_booking(
    conn: &Connection,
    requester_id: &str,
    service_id: &str,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE requester_id = ?1 AND service_id = ?2
           AND status NOT IN ('rejected', 'completed', 'mediation_resolved')",
        params![requester_id, service_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn has_unsettled_mediation_debt(conn: &Connection, requester_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE requester_id = ?1 AND status = 'mediation_resolved' AND credit_transferred = 0",
        params![requester_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Resolved-but-unsettled bookings for a requester, oldest resolution first:
/// the order the settlement scan processes them in.
pub fn unsettled_mediations(conn: &Connection, requester_id: &str) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE requester_id = ?1 AND status = 'mediation_resolved' AND credit_transferred = 0
         ORDER BY mediation_resolved_at ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![requester_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let snapshot_json: String = row.get(6)?;
    let service_snapshot: ServiceSnapshot =
        serde_json::from_str(&snapshot_json).context("corrupt service snapshot")?;

    Ok(Booking {
        id: row.get(0)?,
        service_id: row.get(1)?,
        requester_id: row.get(2)?,
        provider_id: row.get(3)?,
        status: BookingStatus::parse(&row.get::<_, String>(4)?),
        held_credits: row.get(5)?,
        service_snapshot,
        schedule_date: row.get::<_, Option<String>>(7)?.map(|s| parse_ts(&s)),
        scheduled_duration_minutes: row.get(8)?,
        actual_duration_minutes: row.get(9)?,
        proposed_credits: row.get(10)?,
        completion_notes: row.get(11)?,
        confirmed_by_provider: row.get::<_, i32>(12)? != 0,
        confirmed_by_requester: row.get::<_, i32>(13)? != 0,
        dispute_reason: row.get(14)?,
        mediation_requested_by: row.get(15)?,
        mediation_requested_at: row.get::<_, Option<String>>(16)?.map(|s| parse_ts(&s)),
        mediation_additional_info: row.get(17)?,
        mediation_resolved_by: row.get(18)?,
        mediation_resolved_at: row.get::<_, Option<String>>(19)?.map(|s| parse_ts(&s)),
        mediation_decision: row.get(20)?,
        final_credits: row.get(21)?,
        credit_transferred: row.get::<_, i32>(22)? != 0,
        version: row.get(23)?,
        created_at: parse_ts(&row.get::<_, String>(24)?),
        updated_at: parse_ts(&row.get::<_, String>(25)?),
    })
}

// ── Transactions ──

pub fn insert_transaction(conn: &Connection, tx: &CreditTransaction) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO transactions (id, sender_id, recipient_id, amount, kind, status, details, reference_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            tx.id,
            tx.sender_id,
            tx.recipient_id,
            tx.amount,
            tx.kind.as_str(),
            tx.status.as_str(),
            tx.details,
            tx.reference_id,
            fmt_ts(&tx.created_at),
            fmt_ts(&tx.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_transaction(conn: &Connection, id: &str) -> anyhow::Result<Option<CreditTransaction>> {
    query_transaction(conn, "id = ?1", id)
}

pub fn get_transaction_by_reference(
    conn: &Connection,
    reference_id: &str,
) -> anyhow::Result<Option<CreditTransaction>> {
    query_transaction(conn, "reference_id = ?1", reference_id)
}

fn query_transaction(
    conn: &Connection,
    filter: &str,
    value: &str,
) -> anyhow::Result<Option<CreditTransaction>> {
    let result = conn.query_row(
        &format!(
            "SELECT id, sender_id, recipient_id, amount, kind, status, details, reference_id, created_at, updated_at
             FROM transactions WHERE {filter}"
        ),
        params![value],
        |row| {
            Ok(CreditTransaction {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                recipient_id: row.get(2)?,
                amount: row.get(3)?,
                kind: TransactionKind::parse(&row.get::<_, String>(4)?),
                status: TransactionStatus::parse(&row.get::<_, String>(5)?),
                details: row.get(6)?,
                reference_id: row.get(7)?,
                created_at: parse_ts(&row.get::<_, String>(8)?),
                updated_at: parse_ts(&row.get::<_, String>(9)?),
            })
        },
    );

    match result {
        Ok(tx) => Ok(Some(tx)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_transaction_reference(
    conn: &Connection,
    id: &str,
    reference_id: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE transactions SET reference_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![reference_id, fmt_ts(&Utc::now().naive_utc()), id],
    )?;
    Ok(())
}

/// Move a pending record to its final status. The pending guard makes
/// replayed gateway callbacks and duplicate admin decisions no-ops.
pub fn finalize_transaction(
    conn: &Connection,
    id: &str,
    status: TransactionStatus,
    details: Option<&str>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE transactions SET status = ?1, details = COALESCE(?2, details), updated_at = ?3
         WHERE id = ?4 AND status = 'pending'",
        params![status.as_str(), details, fmt_ts(&Utc::now().naive_utc()), id],
    )?;
    Ok(count > 0)
}

// ── Mediation messages ──

pub fn insert_mediation_message(
    conn: &Connection,
    booking_id: &str,
    sender_id: &str,
    body: &str,
    is_from_mediator: bool,
) -> anyhow::Result<MediationMessage> {
    let created_at = fmt_ts(&Utc::now().naive_utc());
    conn.execute(
        "INSERT INTO mediation_messages (booking_id, sender_id, body, is_from_mediator, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![booking_id, sender_id, body, is_from_mediator as i32, created_at],
    )?;

    Ok(MediationMessage {
        id: conn.last_insert_rowid(),
        booking_id: booking_id.to_string(),
        sender_id: sender_id.to_string(),
        body: body.to_string(),
        is_from_mediator,
        created_at,
    })
}

pub fn get_mediation_messages(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Vec<MediationMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, sender_id, body, is_from_mediator, created_at
         FROM mediation_messages WHERE booking_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        Ok(MediationMessage {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            sender_id: row.get(2)?,
            body: row.get(3)?,
            is_from_mediator: row.get::<_, i32>(4)? != 0,
            created_at: row.get(5)?,
        })
    })?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

// ── Timestamps ──

pub fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc())
}
