pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyCategory {
    BookingRequested,
    BookingAccepted,
    BookingRejected,
    CompletionSubmitted,
    BookingCompleted,
    BookingDisputed,
    MediationRequested,
    MediationResolved,
    MediationSettled,
    MediationMessage,
    CreditsPurchased,
    CashoutRequested,
    CashoutResolved,
}

impl NotifyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyCategory::BookingRequested => "booking_requested",
            NotifyCategory::BookingAccepted => "booking_accepted",
            NotifyCategory::BookingRejected => "booking_rejected",
            NotifyCategory::CompletionSubmitted => "completion_submitted",
            NotifyCategory::BookingCompleted => "booking_completed",
            NotifyCategory::BookingDisputed => "booking_disputed",
            NotifyCategory::MediationRequested => "mediation_requested",
            NotifyCategory::MediationResolved => "mediation_resolved",
            NotifyCategory::MediationSettled => "mediation_settled",
            NotifyCategory::MediationMessage => "mediation_message",
            NotifyCategory::CreditsPurchased => "credits_purchased",
            NotifyCategory::CashoutRequested => "cashout_requested",
            NotifyCategory::CashoutResolved => "cashout_resolved",
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(
        &self,
        recipient_id: &str,
        message: &str,
        category: NotifyCategory,
        payload: serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// Fire-and-forget dispatch used by every state transition: skips the acting
/// user when asked, logs failures, never propagates them.
pub async fn dispatch(
    state: &Arc<AppState>,
    recipient_id: &str,
    message: &str,
    category: NotifyCategory,
    payload: serde_json::Value,
    exclude_actor: Option<&str>,
) {
    if exclude_actor == Some(recipient_id) {
        return;
    }

    if let Err(e) = state
        .notifier
        .notify(recipient_id, message, category, payload)
        .await
    {
        tracing::error!(
            error = %e,
            recipient = recipient_id,
            category = category.as_str(),
            "failed to dispatch notification"
        );
    }
}

/// Log-only dispatcher, selected when NOTIFY_WEBHOOK_URL is unset.
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(
        &self,
        recipient_id: &str,
        message: &str,
        category: NotifyCategory,
        _payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        tracing::info!(
            recipient = recipient_id,
            category = category.as_str(),
            message,
            "notification"
        );
        Ok(())
    }
}
