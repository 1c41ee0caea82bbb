use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{PaymentGateway, PaymentSession, PaymentStatus, PaymentVerification};

/// HTTP client for the hosted checkout service.
pub struct HttpCheckoutGateway {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpCheckoutGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct InitiateResponse {
    payment_url: String,
    reference_id: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    status: PaymentStatus,
    amount: i64,
}

#[async_trait]
impl PaymentGateway for HttpCheckoutGateway {
    async fn initiate(
        &self,
        amount: i64,
        purchase_id: &str,
        customer_id: &str,
    ) -> anyhow::Result<PaymentSession> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);

        let res: InitiateResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "amount": amount,
                "order_id": purchase_id,
                "customer": customer_id,
            }))
            .send()
            .await
            .context("failed to reach payment gateway")?
            .error_for_status()
            .context("payment gateway rejected checkout request")?
            .json()
            .await
            .context("invalid checkout response")?;

        Ok(PaymentSession {
            payment_url: res.payment_url,
            reference_id: res.reference_id,
        })
    }

    async fn verify(&self, reference_id: &str) -> anyhow::Result<PaymentVerification> {
        let url = format!("{}/v1/checkout/sessions/{reference_id}", self.base_url);

        let res: VerifyResponse = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to reach payment gateway")?
            .error_for_status()
            .context("payment gateway rejected verify request")?
            .json()
            .await
            .context("invalid verify response")?;

        Ok(PaymentVerification {
            status: res.status,
            amount: res.amount,
        })
    }
}
