use anyhow::Context;
use rusqlite::Connection;

// Migrations ship inside the binary so `:memory:` databases and deployed
// instances always carry the full schema. Applied once each, in order,
// tracked in _migrations.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_users",
        "CREATE TABLE users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            time_credits INTEGER NOT NULL DEFAULT 0 CHECK (time_credits >= 0),
            held_credits INTEGER NOT NULL DEFAULT 0 CHECK (held_credits >= 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    ),
    (
        "0002_services",
        "CREATE TABLE services (
            id TEXT PRIMARY KEY,
            provider_id TEXT NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            description TEXT,
            duration_minutes INTEGER NOT NULL,
            credits INTEGER NOT NULL CHECK (credits >= 0),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );",
    ),
    (
        "0003_bookings",
        "CREATE TABLE bookings (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL REFERENCES services(id),
            requester_id TEXT NOT NULL REFERENCES users(id),
            provider_id TEXT NOT NULL REFERENCES users(id),
            status TEXT NOT NULL,
            held_credits INTEGER NOT NULL CHECK (held_credits >= 0),
            service_snapshot TEXT NOT NULL,
            schedule_date TEXT,
            scheduled_duration_minutes INTEGER,
            actual_duration_minutes INTEGER,
            proposed_credits INTEGER,
            completion_notes TEXT,
            confirmed_by_provider INTEGER NOT NULL DEFAULT 0,
            confirmed_by_requester INTEGER NOT NULL DEFAULT 0,
            dispute_reason TEXT,
            mediation_requested_by TEXT,
            mediation_requested_at TEXT,
            mediation_additional_info TEXT,
            mediation_resolved_by TEXT,
            mediation_resolved_at TEXT,
            mediation_decision TEXT,
            final_credits INTEGER,
            credit_transferred INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX idx_bookings_requester ON bookings(requester_id, status);
        CREATE INDEX idx_bookings_service ON bookings(service_id, requester_id);",
    ),
    (
        "0004_transactions",
        "CREATE TABLE transactions (
            id TEXT PRIMARY KEY,
            sender_id TEXT REFERENCES users(id),
            recipient_id TEXT REFERENCES users(id),
            amount INTEGER NOT NULL CHECK (amount >= 0),
            kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'completed',
            details TEXT,
            reference_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX idx_transactions_reference ON transactions(reference_id);",
    ),
    (
        "0005_mediation_messages",
        "CREATE TABLE mediation_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            booking_id TEXT NOT NULL REFERENCES bookings(id),
            sender_id TEXT NOT NULL REFERENCES users(id),
            body TEXT NOT NULL,
            is_from_mediator INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX idx_mediation_messages_booking ON mediation_messages(booking_id);",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
