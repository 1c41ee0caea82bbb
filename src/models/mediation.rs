use serde::{Deserialize, Serialize};

/// Append-only chat entry on a mediation case. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediationMessage {
    pub id: i64,
    pub booking_id: String,
    pub sender_id: String,
    pub body: String,
    /// Set iff the sender is an admin; derived server-side, never client input.
    pub is_from_mediator: bool,
    pub created_at: String,
}
