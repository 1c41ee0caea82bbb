use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A provider's offering. Created and managed by the surrounding platform;
/// the core only reads it when a booking is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: String,
    pub provider_id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    /// Required credits, minor units.
    pub credits: i64,
    pub active: bool,
    pub created_at: NaiveDateTime,
}
