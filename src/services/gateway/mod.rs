pub mod checkout;

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub payment_url: String,
    pub reference_id: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
    Pending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub status: PaymentStatus,
    /// Amount the customer actually paid, minor units.
    pub amount: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment session for a credit purchase; the returned URL is
    /// where the customer completes payment.
    async fn initiate(
        &self,
        amount: i64,
        purchase_id: &str,
        customer_id: &str,
    ) -> anyhow::Result<PaymentSession>;

    /// Server-to-server status check for a session. Callbacks are never
    /// trusted on their own; this is the source of truth.
    async fn verify(&self, reference_id: &str) -> anyhow::Result<PaymentVerification>;
}
