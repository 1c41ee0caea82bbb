use anyhow::Context;
use async_trait::async_trait;

use super::{NotificationDispatcher, NotifyCategory};

/// Pushes notifications to the platform's delivery service, which owns
/// fan-out and transport (socket, email, push).
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn notify(
        &self,
        recipient_id: &str,
        message: &str,
        category: NotifyCategory,
        payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&serde_json::json!({
                "recipient": recipient_id,
                "message": message,
                "category": category.as_str(),
                "payload": payload,
            }))
            .send()
            .await
            .context("failed to reach notification service")?
            .error_for_status()
            .context("notification service returned error")?;

        Ok(())
    }
}
