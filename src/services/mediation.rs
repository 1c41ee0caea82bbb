//! Admin-adjudicated dispute handling. Resolution releases the creation-time
//! hold, records the binding final amount, and settles it from the
//! requester's live balance: immediately when it fits, otherwise whenever a
//! later top-up makes room.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, MediationMessage, TransactionKind, User};
use crate::services::booking::{
    booking_payload, load_booking, require_status, stale,
};
use crate::services::ledger;
use crate::services::notify::{self, NotifyCategory};
use crate::state::AppState;

/// Either party escalates a disputed booking to mediation. All admins and
/// the other party are notified.
pub async fn request(
    state: &Arc<AppState>,
    actor: &User,
    booking_id: &str,
    additional_info: Option<String>,
) -> Result<Booking, AppError> {
    let (booking, admin_ids) = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        if !booking.is_participant(&actor.id) {
            return Err(AppError::Unauthorized);
        }
        require_status(&booking, BookingStatus::Disputed, "request mediation for")?;

        let expected = booking.version;
        booking.status = BookingStatus::InMediation;
        booking.mediation_requested_by = Some(actor.id.clone());
        booking.mediation_requested_at = Some(Utc::now().naive_utc());
        booking.mediation_additional_info = additional_info;
        if !queries::save_booking(&tx, &mut booking, expected)? {
            return Err(stale());
        }

        let admin_ids = queries::get_admin_ids(&tx)?;
        tx.commit()?;
        (booking, admin_ids)
    };

    let message = format!(
        "Mediation requested for \"{}\"",
        booking.service_snapshot.title
    );
    let payload = booking_payload(&booking);

    for admin_id in &admin_ids {
        notify::dispatch(
            state,
            admin_id,
            &message,
            NotifyCategory::MediationRequested,
            payload.clone(),
            Some(&actor.id),
        )
        .await;
    }
    notify::dispatch(
        state,
        booking.other_party(&actor.id),
        &message,
        NotifyCategory::MediationRequested,
        payload,
        Some(&actor.id),
    )
    .await;

    Ok(booking)
}

/// Admin decision on a mediated booking. Releases the hold, records the
/// final amount, and attempts settlement in the same transaction.
pub async fn resolve(
    state: &Arc<AppState>,
    admin: &User,
    booking_id: &str,
    decision: &str,
    final_credits: i64,
) -> Result<Booking, AppError> {
    if !admin.is_admin() {
        return Err(AppError::Unauthorized);
    }
    if final_credits < 0 {
        return Err(AppError::Validation(
            "final_credits must not be negative".to_string(),
        ));
    }

    let booking = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        require_status(&booking, BookingStatus::InMediation, "resolve")?;

        // The hold is reconciled here, exactly once; settlement below draws
        // on the live balance only.
        ledger::release(&tx, &booking.requester_id, booking.held_credits)?;

        let expected = booking.version;
        booking.status = BookingStatus::MediationResolved;
        booking.mediation_resolved_by = Some(admin.id.clone());
        booking.mediation_resolved_at = Some(Utc::now().naive_utc());
        booking.mediation_decision = Some(decision.to_string());
        booking.final_credits = Some(final_credits);
        booking.credit_transferred = false;

        try_settle(&tx, &mut booking)?;

        if !queries::save_booking(&tx, &mut booking, expected)? {
            return Err(stale());
        }
        tx.commit()?;
        booking
    };

    tracing::info!(
        booking = %booking.id,
        final_credits,
        settled = booking.credit_transferred,
        "mediation resolved"
    );

    let message = format!(
        "Mediation for \"{}\" was resolved: {final_credits} credits to the provider",
        booking.service_snapshot.title
    );
    let payload = booking_payload(&booking);
    for party in [&booking.requester_id, &booking.provider_id] {
        notify::dispatch(
            state,
            party,
            &message,
            NotifyCategory::MediationResolved,
            payload.clone(),
            None,
        )
        .await;
    }

    if booking.credit_transferred {
        notify_settled(state, &booking).await;
    }

    Ok(booking)
}

/// Scan a requester's resolved-but-unsettled mediations after their balance
/// grew, oldest resolution first. Candidates the balance cannot cover are
/// skipped so cheaper later ones still get a chance.
pub async fn settle_pending(
    state: &Arc<AppState>,
    user_id: &str,
) -> Result<Vec<Booking>, AppError> {
    let settled = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut settled = vec![];
        for mut booking in queries::unsettled_mediations(&tx, user_id)? {
            let expected = booking.version;
            if !try_settle(&tx, &mut booking)? {
                continue;
            }
            if !queries::save_booking(&tx, &mut booking, expected)? {
                // Concurrent writer took this booking; leave it for them.
                tracing::warn!(booking = %booking.id, "skipping concurrently-modified settlement");
                continue;
            }
            settled.push(booking);
        }
        tx.commit()?;
        settled
    };

    for booking in &settled {
        notify_settled(state, booking).await;
    }

    Ok(settled)
}

/// Transfer the final amount if the requester's balance covers it. Returns
/// whether the booking settled; an uncovered amount is not an error.
fn try_settle(conn: &Connection, booking: &mut Booking) -> Result<bool, AppError> {
    let final_credits = booking.final_credits.ok_or_else(|| {
        AppError::InvalidState("resolved mediation without a final amount".to_string())
    })?;

    let result = ledger::transfer(
        conn,
        &booking.requester_id,
        &booking.provider_id,
        final_credits,
        TransactionKind::MediationSettlement,
        Some(&format!("booking {}", booking.id)),
    );

    match result {
        Ok(_) => {
            booking.credit_transferred = true;
            Ok(true)
        }
        Err(AppError::InsufficientCredits) => Ok(false),
        Err(e) => Err(e),
    }
}

async fn notify_settled(state: &Arc<AppState>, booking: &Booking) {
    let message = format!(
        "Mediation settlement for \"{}\" completed: {} credits transferred",
        booking.service_snapshot.title,
        booking.final_credits.unwrap_or(0)
    );
    let payload = booking_payload(booking);
    for party in [&booking.requester_id, &booking.provider_id] {
        notify::dispatch(
            state,
            party,
            &message,
            NotifyCategory::MediationSettled,
            payload.clone(),
            None,
        )
        .await;
    }
}

// ── Mediation chat ──

/// Append a message to a mediation case. `is_from_mediator` is derived from
/// the sender's role; clients never set it.
pub async fn post_message(
    state: &Arc<AppState>,
    actor: &User,
    booking_id: &str,
    body: &str,
) -> Result<MediationMessage, AppError> {
    let (message, booking) = {
        let db = state.db.lock().unwrap();

        let booking = load_booking(&db, booking_id)?;
        if !booking.is_participant(&actor.id) && !actor.is_admin() {
            return Err(AppError::Unauthorized);
        }
        if !matches!(
            booking.status,
            BookingStatus::InMediation | BookingStatus::MediationResolved
        ) {
            return Err(AppError::InvalidTransition(format!(
                "booking in status '{}' has no mediation case",
                booking.status.as_str()
            )));
        }

        let message =
            queries::insert_mediation_message(&db, booking_id, &actor.id, body, actor.is_admin())?;
        (message, booking)
    };

    let notice = format!(
        "New mediation message on \"{}\"",
        booking.service_snapshot.title
    );
    let payload = serde_json::json!({
        "booking_id": booking.id,
        "message_id": message.id,
        "from_mediator": message.is_from_mediator,
    });
    for party in [&booking.requester_id, &booking.provider_id] {
        notify::dispatch(
            state,
            party,
            &notice,
            NotifyCategory::MediationMessage,
            payload.clone(),
            Some(&actor.id),
        )
        .await;
    }

    Ok(message)
}

pub fn list_messages(
    state: &Arc<AppState>,
    actor: &User,
    booking_id: &str,
) -> Result<Vec<MediationMessage>, AppError> {
    let db = state.db.lock().unwrap();

    let booking = load_booking(&db, booking_id)?;
    if !booking.is_participant(&actor.id) && !actor.is_admin() {
        return Err(AppError::Unauthorized);
    }

    Ok(queries::get_mediation_messages(&db, booking_id)?)
}
