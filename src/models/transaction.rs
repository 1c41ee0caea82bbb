use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Immutable audit record of a ledger movement. Only `status` ever changes,
/// and only on pending purchase/cashout records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    /// Minor units.
    pub amount: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub details: Option<String>,
    /// Payment-gateway reference, purchase records only.
    pub reference_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Cashout,
    BookingPayment,
    MediationSettlement,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Cashout => "cashout",
            TransactionKind::BookingPayment => "booking_payment",
            TransactionKind::MediationSettlement => "mediation_settlement",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cashout" => TransactionKind::Cashout,
            "booking_payment" => TransactionKind::BookingPayment,
            "mediation_settlement" => TransactionKind::MediationSettlement,
            _ => TransactionKind::Purchase,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => TransactionStatus::Completed,
            "failed" => TransactionStatus::Failed,
            "rejected" => TransactionStatus::Rejected,
            _ => TransactionStatus::Pending,
        }
    }
}
