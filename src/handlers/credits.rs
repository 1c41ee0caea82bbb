use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Form, Json};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::errors::AppError;
use crate::services::credits;
use crate::state::AppState;

use super::{require_actor, require_admin};

// POST /api/credits/purchase
#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub amount: Option<i64>,
}

#[derive(Serialize)]
pub struct PurchaseResponse {
    transaction_id: String,
    reference_id: String,
    payment_url: String,
}

pub async fn start_purchase(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let amount = body
        .amount
        .ok_or_else(|| AppError::Validation("amount is required".to_string()))?;

    let started = credits::start_purchase(&state, &actor, amount).await?;
    Ok(Json(PurchaseResponse {
        transaction_id: started.transaction.id,
        reference_id: started.session.reference_id,
        payment_url: started.session.payment_url,
    }))
}

// POST /api/credits/purchase/callback
//
// Called by the payment gateway, not by users. Authenticated with an HMAC
// signature over the form params; the payment itself is then re-verified
// server-to-server before any credits move.
#[derive(Deserialize)]
pub struct PurchaseCallbackForm {
    pub reference_id: String,
}

#[derive(Serialize)]
pub struct PurchaseCallbackResponse {
    reference_id: String,
    status: String,
}

pub async fn purchase_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<PurchaseCallbackForm>,
) -> Result<Json<PurchaseCallbackResponse>, AppError> {
    // Skip signature validation when no secret is configured (dev mode).
    if !state.config.gateway_callback_secret.is_empty() {
        let signature = headers
            .get("x-gateway-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let params = [("reference_id", form.reference_id.as_str())];
        if !validate_callback_signature(&state.config.gateway_callback_secret, signature, &params)
        {
            tracing::warn!(reference = %form.reference_id, "invalid gateway callback signature");
            return Err(AppError::Unauthorized);
        }
    }

    let status = credits::handle_purchase_callback(&state, &form.reference_id).await?;
    Ok(Json(PurchaseCallbackResponse {
        reference_id: form.reference_id,
        status: status.as_str().to_string(),
    }))
}

fn validate_callback_signature(secret: &str, signature: &str, params: &[(&str, &str)]) -> bool {
    if signature.is_empty() {
        return false;
    }

    // Sign the sorted params concatenated as key+value.
    let mut sorted_params = params.to_vec();
    sorted_params.sort_by(|a, b| a.0.cmp(b.0));
    let mut data = String::new();
    for (key, value) in &sorted_params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    expected == signature
}

// POST /api/credits/cashout
#[derive(Deserialize)]
pub struct CashoutRequest {
    pub amount: Option<i64>,
}

#[derive(Serialize)]
pub struct CashoutResponse {
    transaction_id: String,
    amount: i64,
    status: String,
}

pub async fn request_cashout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CashoutRequest>,
) -> Result<Json<CashoutResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let amount = body
        .amount
        .ok_or_else(|| AppError::Validation("amount is required".to_string()))?;

    let transaction = credits::request_cashout(&state, &actor, amount).await?;
    Ok(Json(CashoutResponse {
        transaction_id: transaction.id,
        amount: transaction.amount,
        status: transaction.status.as_str().to_string(),
    }))
}

// POST /api/credits/cashout/:id/resolve
#[derive(Deserialize)]
pub struct ResolveCashoutRequest {
    pub approve: Option<bool>,
}

pub async fn resolve_cashout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ResolveCashoutRequest>,
) -> Result<Json<CashoutResponse>, AppError> {
    let actor = require_admin(&state, &headers)?;
    let approve = body
        .approve
        .ok_or_else(|| AppError::Validation("approve is required".to_string()))?;

    let transaction = credits::resolve_cashout(&state, &actor, &id, approve).await?;
    Ok(Json(CashoutResponse {
        transaction_id: transaction.id,
        amount: transaction.amount,
        status: transaction.status.as_str().to_string(),
    }))
}

// GET /api/credits/balance
#[derive(Serialize)]
pub struct BalanceResponse {
    user_id: String,
    time_credits: i64,
    held_credits: i64,
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<BalanceResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    Ok(Json(BalanceResponse {
        user_id: actor.id,
        time_credits: actor.time_credits,
        held_credits: actor.held_credits,
    }))
}

#[cfg(test)]
mod tests {
    use super::validate_callback_signature;
    use base64::Engine;
    use hmac::{Hmac, Mac};
    use sha1::Sha1;

    fn sign(secret: &str, data: &str) -> String {
        let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let signature = sign("secret", "reference_idref-1");
        assert!(validate_callback_signature(
            "secret",
            &signature,
            &[("reference_id", "ref-1")]
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signature = sign("other", "reference_idref-1");
        assert!(!validate_callback_signature(
            "secret",
            &signature,
            &[("reference_id", "ref-1")]
        ));
    }

    #[test]
    fn test_empty_signature_rejected() {
        assert!(!validate_callback_signature(
            "secret",
            "",
            &[("reference_id", "ref-1")]
        ));
    }
}
