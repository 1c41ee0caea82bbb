use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("unsettled mediation debt blocks new bookings; top up to clear it")]
    PendingMediationDebt,

    #[error("{0}")]
    Validation(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
            AppError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
            AppError::InsufficientCredits => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_credits")
            }
            AppError::PendingMediationDebt => {
                (StatusCode::UNPROCESSABLE_ENTITY, "pending_mediation_debt")
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error"),
        };

        // Database details stay server-side; everything else is safe to return.
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "an internal error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({ "error": { "code": code, "message": message } });
        (status, axum::Json(body)).into_response()
    }
}
