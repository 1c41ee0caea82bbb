use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub service_id: String,
    pub requester_id: String,
    pub provider_id: String,
    pub status: BookingStatus,
    /// Credits debited from the requester at creation, minor units.
    pub held_credits: i64,
    /// Immutable copy of the offering as it stood at request time.
    pub service_snapshot: ServiceSnapshot,
    pub schedule_date: Option<NaiveDateTime>,
    pub scheduled_duration_minutes: Option<i32>,
    pub actual_duration_minutes: Option<i32>,
    /// Provider's claimed final amount, minor units.
    pub proposed_credits: Option<i64>,
    pub completion_notes: Option<String>,
    pub confirmed_by_provider: bool,
    pub confirmed_by_requester: bool,
    pub dispute_reason: Option<String>,
    pub mediation_requested_by: Option<String>,
    pub mediation_requested_at: Option<NaiveDateTime>,
    pub mediation_additional_info: Option<String>,
    pub mediation_resolved_by: Option<String>,
    pub mediation_resolved_at: Option<NaiveDateTime>,
    pub mediation_decision: Option<String>,
    /// Admin-set final amount, minor units.
    pub final_credits: Option<i64>,
    /// Flips false -> true exactly once, when the final ledger transfer lands.
    pub credit_transferred: bool,
    /// Optimistic concurrency token. Bumped on every update.
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub credits: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Scheduled,
    Rejected,
    AwaitingConfirmation,
    Completed,
    Disputed,
    InMediation,
    MediationResolved,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Rejected => "rejected",
            BookingStatus::AwaitingConfirmation => "awaiting_confirmation",
            BookingStatus::Completed => "completed",
            BookingStatus::Disputed => "disputed",
            BookingStatus::InMediation => "in_mediation",
            BookingStatus::MediationResolved => "mediation_resolved",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => BookingStatus::Scheduled,
            "rejected" => BookingStatus::Rejected,
            "awaiting_confirmation" => BookingStatus::AwaitingConfirmation,
            "completed" => BookingStatus::Completed,
            "disputed" => BookingStatus::Disputed,
            "in_mediation" => BookingStatus::InMediation,
            "mediation_resolved" => BookingStatus::MediationResolved,
            _ => BookingStatus::Pending,
        }
    }

    /// Terminal statuses do not count against the one-open-booking-per-service
    /// rule. `MediationResolved` is terminal for the lifecycle even while its
    /// ledger settlement is still outstanding.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Completed | BookingStatus::MediationResolved
        )
    }
}

impl Booking {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.requester_id == user_id || self.provider_id == user_id
    }

    /// The counterparty of `user_id`, used when notifying "the other party".
    pub fn other_party(&self, user_id: &str) -> &str {
        if self.requester_id == user_id {
            &self.provider_id
        } else {
            &self.requester_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        let all = [
            BookingStatus::Pending,
            BookingStatus::Scheduled,
            BookingStatus::Rejected,
            BookingStatus::AwaitingConfirmation,
            BookingStatus::Completed,
            BookingStatus::Disputed,
            BookingStatus::InMediation,
            BookingStatus::MediationResolved,
        ];
        for status in all {
            assert_eq!(BookingStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_pending() {
        assert_eq!(BookingStatus::parse("garbage"), BookingStatus::Pending);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BookingStatus::Rejected.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::MediationResolved.is_terminal());
        assert!(!BookingStatus::Disputed.is_terminal());
        assert!(!BookingStatus::InMediation.is_terminal());
        assert!(!BookingStatus::Pending.is_terminal());
    }
}
