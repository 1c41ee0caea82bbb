use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::Booking;
use crate::services::booking;
use crate::state::AppState;

use super::require_actor;

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    service_id: String,
    requester_id: String,
    provider_id: String,
    status: String,
    held_credits: i64,
    service_title: String,
    schedule_date: Option<String>,
    scheduled_duration_minutes: Option<i32>,
    actual_duration_minutes: Option<i32>,
    proposed_credits: Option<i64>,
    completion_notes: Option<String>,
    confirmed_by_provider: bool,
    confirmed_by_requester: bool,
    dispute_reason: Option<String>,
    mediation_decision: Option<String>,
    final_credits: Option<i64>,
    credit_transferred: bool,
    created_at: String,
    updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        BookingResponse {
            id: b.id,
            service_id: b.service_id,
            requester_id: b.requester_id,
            provider_id: b.provider_id,
            status: b.status.as_str().to_string(),
            held_credits: b.held_credits,
            service_title: b.service_snapshot.title,
            schedule_date: b.schedule_date.map(|d| fmt(&d)),
            scheduled_duration_minutes: b.scheduled_duration_minutes,
            actual_duration_minutes: b.actual_duration_minutes,
            proposed_credits: b.proposed_credits,
            completion_notes: b.completion_notes,
            confirmed_by_provider: b.confirmed_by_provider,
            confirmed_by_requester: b.confirmed_by_requester,
            dispute_reason: b.dispute_reason,
            mediation_decision: b.mediation_decision,
            final_credits: b.final_credits,
            credit_transferred: b.credit_transferred,
            created_at: fmt(&b.created_at),
            updated_at: fmt(&b.updated_at),
        }
    }
}

fn fmt(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn parse_schedule_date(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| {
            AppError::Validation("schedule_date must be formatted YYYY-MM-DD HH:MM".to_string())
        })
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let service_id = body
        .service_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("service_id is required".to_string()))?;

    let booking = booking::create(&state, &actor, &service_id).await?;
    Ok(Json(booking.into()))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let booking = booking::get_for(&state, &actor, &id)?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/accept
#[derive(Deserialize)]
pub struct AcceptBookingRequest {
    pub schedule_date: Option<String>,
    pub duration_minutes: Option<i32>,
}

pub async fn accept_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AcceptBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let schedule_date = body
        .schedule_date
        .as_deref()
        .ok_or_else(|| AppError::Validation("schedule_date is required".to_string()))
        .and_then(parse_schedule_date)?;
    let duration_minutes = body
        .duration_minutes
        .ok_or_else(|| AppError::Validation("duration_minutes is required".to_string()))?;

    let booking = booking::accept(&state, &actor, &id, schedule_date, duration_minutes).await?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/reject
pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let booking = booking::reject(&state, &actor, &id).await?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/complete
#[derive(Deserialize)]
pub struct CompleteBookingRequest {
    pub actual_duration_minutes: Option<i32>,
    pub proposed_credits: Option<i64>,
    pub completion_notes: Option<String>,
}

pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CompleteBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let actual_duration_minutes = body.actual_duration_minutes.ok_or_else(|| {
        AppError::Validation("actual_duration_minutes is required".to_string())
    })?;
    let proposed_credits = body
        .proposed_credits
        .ok_or_else(|| AppError::Validation("proposed_credits is required".to_string()))?;

    let booking = booking::submit_completion(
        &state,
        &actor,
        &id,
        actual_duration_minutes,
        proposed_credits,
        body.completion_notes,
    )
    .await?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let booking = booking::confirm_completion(&state, &actor, &id).await?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/dispute
#[derive(Deserialize)]
pub struct DisputeBookingRequest {
    pub reason: Option<String>,
}

pub async fn dispute_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DisputeBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = require_actor(&state, &headers)?;
    let reason = body
        .reason
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| AppError::Validation("reason is required".to_string()))?;

    let booking = booking::dispute(&state, &actor, &id, &reason).await?;
    Ok(Json(booking.into()))
}
