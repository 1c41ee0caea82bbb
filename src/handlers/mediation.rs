use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::MediationMessage;
use crate::services::mediation;
use crate::state::AppState;

use super::bookings::BookingResponse;
use super::{require_actor, require_admin};

// POST /api/bookings/:id/mediation
#[derive(Deserialize)]
pub struct RequestMediationRequest {
    pub additional_info: Option<String>,
}

pub async fn request_mediation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RequestMediationRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let booking = mediation::request(&state, &actor, &id, body.additional_info).await?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/mediation/resolve
#[derive(Deserialize)]
pub struct ResolveMediationRequest {
    pub decision: Option<String>,
    pub final_credits: Option<i64>,
}

pub async fn resolve_mediation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ResolveMediationRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_admin(&state, &headers)?;
    let decision = body
        .decision
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::Validation("decision is required".to_string()))?;
    let final_credits = body
        .final_credits
        .ok_or_else(|| AppError::Validation("final_credits is required".to_string()))?;

    let booking = mediation::resolve(&state, &actor, &id, &decision, final_credits).await?;
    Ok(Json(booking.into()))
}

// ── Mediation chat ──

#[derive(Serialize)]
pub struct MediationMessageResponse {
    id: i64,
    booking_id: String,
    sender_id: String,
    body: String,
    is_from_mediator: bool,
    created_at: String,
}

impl From<MediationMessage> for MediationMessageResponse {
    fn from(m: MediationMessage) -> Self {
        MediationMessageResponse {
            id: m.id,
            booking_id: m.booking_id,
            sender_id: m.sender_id,
            body: m.body,
            is_from_mediator: m.is_from_mediator,
            created_at: m.created_at,
        }
    }
}

// POST /api/bookings/:id/mediation/messages
#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub body: Option<String>,
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<MediationMessageResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let text = body
        .body
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| AppError::Validation("body is required".to_string()))?;

    let message = mediation::post_message(&state, &actor, &id, &text).await?;
    Ok(Json(message.into()))
}

// GET /api/bookings/:id/mediation/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<MediationMessageResponse>>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let messages = mediation::list_messages(&state, &actor, &id)?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}
