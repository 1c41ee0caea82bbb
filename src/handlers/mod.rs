pub mod bookings;
pub mod credits;
pub mod health;
pub mod mediation;

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::User;
use crate::state::AppState;

/// Resolve the acting user from the `x-user-id` header set by the upstream
/// auth layer.
pub(crate) fn require_actor(state: &Arc<AppState>, headers: &HeaderMap) -> Result<User, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if user_id.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let db = state.db.lock().unwrap();
    queries::get_user(&db, user_id)?.ok_or(AppError::Unauthorized)
}

pub(crate) fn require_admin(state: &Arc<AppState>, headers: &HeaderMap) -> Result<User, AppError> {
    let actor = require_actor(state, headers)?;
    if !actor.is_admin() {
        return Err(AppError::Unauthorized);
    }
    Ok(actor)
}
