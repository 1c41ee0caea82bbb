//! Booking lifecycle state machine. Every transition validates the acting
//! user and the current status, applies booking + ledger mutations in one
//! SQLite transaction, and notifies the counterparty after commit.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, ServiceSnapshot, TransactionKind, User};
use crate::services::ledger;
use crate::services::notify::{self, NotifyCategory};
use crate::state::AppState;

pub(crate) fn stale() -> AppError {
    AppError::InvalidTransition("booking was modified concurrently; refetch and retry".to_string())
}

/// Requester asks for a service. Holds the required credits and opens the
/// booking as `pending`.
pub async fn create(
    state: &Arc<AppState>,
    requester: &User,
    service_id: &str,
) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let service = queries::get_service(&tx, service_id)?
            .ok_or_else(|| AppError::NotFound("service".to_string()))?;

        if !service.active {
            return Err(AppError::Validation(
                "service is not accepting bookings".to_string(),
            ));
        }
        if service.provider_id == requester.id {
            return Err(AppError::Validation(
                "cannot book your own service".to_string(),
            ));
        }

        // Both cross-booking checks read current state inside the same
        // transaction that takes the hold.
        if queries::has_unsettled_mediation_debt(&tx, &requester.id)? {
            return Err(AppError::PendingMediationDebt);
        }
        if queries::has_open_booking(&tx, &requester.id, service_id)? {
            return Err(AppError::InvalidTransition(
                "an open booking for this service already exists".to_string(),
            ));
        }

        ledger::hold(&tx, &requester.id, service.credits)?;

        let now = Utc::now().naive_utc();
        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            service_id: service.id.clone(),
            requester_id: requester.id.clone(),
            provider_id: service.provider_id.clone(),
            status: BookingStatus::Pending,
            held_credits: service.credits,
            service_snapshot: ServiceSnapshot {
                title: service.title.clone(),
                description: service.description.clone(),
                duration_minutes: service.duration_minutes,
                credits: service.credits,
            },
            schedule_date: None,
            scheduled_duration_minutes: None,
            actual_duration_minutes: None,
            proposed_credits: None,
            completion_notes: None,
            confirmed_by_provider: false,
            confirmed_by_requester: false,
            dispute_reason: None,
            mediation_requested_by: None,
            mediation_requested_at: None,
            mediation_additional_info: None,
            mediation_resolved_by: None,
            mediation_resolved_at: None,
            mediation_decision: None,
            final_credits: None,
            credit_transferred: false,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&tx, &booking)?;
        tx.commit()?;
        booking
    };

    tracing::info!(
        booking = %booking.id,
        requester = %requester.id,
        provider = %booking.provider_id,
        held = booking.held_credits,
        "booking created"
    );

    notify::dispatch(
        state,
        &booking.provider_id,
        &format!(
            "{} requested your service \"{}\"",
            requester.name, booking.service_snapshot.title
        ),
        NotifyCategory::BookingRequested,
        booking_payload(&booking),
        Some(&requester.id),
    )
    .await;

    Ok(booking)
}

/// Provider accepts a pending request with a concrete schedule.
pub async fn accept(
    state: &Arc<AppState>,
    provider: &User,
    booking_id: &str,
    schedule_date: NaiveDateTime,
    duration_minutes: i32,
) -> Result<Booking, AppError> {
    if duration_minutes <= 0 {
        return Err(AppError::Validation(
            "duration_minutes must be positive".to_string(),
        ));
    }

    let booking = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        require_actor(&booking.provider_id, provider)?;
        require_status(&booking, BookingStatus::Pending, "accept")?;

        let expected = booking.version;
        booking.status = BookingStatus::Scheduled;
        booking.schedule_date = Some(schedule_date);
        booking.scheduled_duration_minutes = Some(duration_minutes);
        if !queries::save_booking(&tx, &mut booking, expected)? {
            return Err(stale());
        }
        tx.commit()?;
        booking
    };

    notify::dispatch(
        state,
        &booking.requester_id,
        &format!(
            "\"{}\" was accepted and scheduled for {}",
            booking.service_snapshot.title,
            schedule_date.format("%Y-%m-%d %H:%M")
        ),
        NotifyCategory::BookingAccepted,
        booking_payload(&booking),
        Some(&provider.id),
    )
    .await;

    Ok(booking)
}

/// Provider declines a pending request; the requester's hold is released.
pub async fn reject(
    state: &Arc<AppState>,
    provider: &User,
    booking_id: &str,
) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        require_actor(&booking.provider_id, provider)?;
        require_status(&booking, BookingStatus::Pending, "reject")?;

        ledger::release(&tx, &booking.requester_id, booking.held_credits)?;

        let expected = booking.version;
        booking.status = BookingStatus::Rejected;
        if !queries::save_booking(&tx, &mut booking, expected)? {
            return Err(stale());
        }
        tx.commit()?;
        booking
    };

    notify::dispatch(
        state,
        &booking.requester_id,
        &format!(
            "\"{}\" was declined; your {} held credits were returned",
            booking.service_snapshot.title, booking.held_credits
        ),
        NotifyCategory::BookingRejected,
        booking_payload(&booking),
        Some(&provider.id),
    )
    .await;

    Ok(booking)
}

/// Provider reports the work done and claims a final credit amount.
pub async fn submit_completion(
    state: &Arc<AppState>,
    provider: &User,
    booking_id: &str,
    actual_duration_minutes: i32,
    proposed_credits: i64,
    completion_notes: Option<String>,
) -> Result<Booking, AppError> {
    if actual_duration_minutes <= 0 {
        return Err(AppError::Validation(
            "actual_duration_minutes must be positive".to_string(),
        ));
    }
    if proposed_credits < 0 {
        return Err(AppError::Validation(
            "proposed_credits must not be negative".to_string(),
        ));
    }

    let booking = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        require_actor(&booking.provider_id, provider)?;
        require_status(&booking, BookingStatus::Scheduled, "submit completion for")?;

        let expected = booking.version;
        booking.status = BookingStatus::AwaitingConfirmation;
        booking.confirmed_by_provider = true;
        booking.actual_duration_minutes = Some(actual_duration_minutes);
        booking.proposed_credits = Some(proposed_credits);
        booking.completion_notes = completion_notes;
        if !queries::save_booking(&tx, &mut booking, expected)? {
            return Err(stale());
        }
        tx.commit()?;
        booking
    };

    notify::dispatch(
        state,
        &booking.requester_id,
        &format!(
            "\"{}\" was marked complete; please confirm or dispute",
            booking.service_snapshot.title
        ),
        NotifyCategory::CompletionSubmitted,
        booking_payload(&booking),
        Some(&provider.id),
    )
    .await;

    Ok(booking)
}

/// Requester signs off on the completed work. The creation-time hold is
/// released and the proposed amount is transferred to the provider, all in
/// one transaction; a shortfall rolls everything back and leaves the booking
/// awaiting confirmation.
pub async fn confirm_completion(
    state: &Arc<AppState>,
    requester: &User,
    booking_id: &str,
) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        require_actor(&booking.requester_id, requester)?;
        require_status(&booking, BookingStatus::AwaitingConfirmation, "confirm")?;
        if !booking.confirmed_by_provider {
            return Err(AppError::InvalidTransition(
                "provider has not submitted completion".to_string(),
            ));
        }

        let proposed = booking.proposed_credits.ok_or_else(|| {
            AppError::InvalidState("awaiting confirmation without a proposed amount".to_string())
        })?;

        ledger::release(&tx, &booking.requester_id, booking.held_credits)?;
        ledger::transfer(
            &tx,
            &booking.requester_id,
            &booking.provider_id,
            proposed,
            TransactionKind::BookingPayment,
            Some(&format!("booking {}", booking.id)),
        )?;

        let expected = booking.version;
        booking.status = BookingStatus::Completed;
        booking.confirmed_by_requester = true;
        booking.credit_transferred = true;
        if !queries::save_booking(&tx, &mut booking, expected)? {
            return Err(stale());
        }
        tx.commit()?;
        booking
    };

    tracing::info!(
        booking = %booking.id,
        amount = booking.proposed_credits,
        "booking completed, credits transferred"
    );

    notify::dispatch(
        state,
        &booking.provider_id,
        &format!(
            "{} confirmed \"{}\"; {} credits transferred",
            requester.name,
            booking.service_snapshot.title,
            booking.proposed_credits.unwrap_or(0)
        ),
        NotifyCategory::BookingCompleted,
        booking_payload(&booking),
        Some(&requester.id),
    )
    .await;

    Ok(booking)
}

/// Requester contests the submitted completion instead of confirming it.
/// The hold stays in place until mediation resolves the case.
pub async fn dispute(
    state: &Arc<AppState>,
    requester: &User,
    booking_id: &str,
    reason: &str,
) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        require_actor(&booking.requester_id, requester)?;
        require_status(&booking, BookingStatus::AwaitingConfirmation, "dispute")?;
        if !booking.confirmed_by_provider {
            return Err(AppError::InvalidTransition(
                "provider has not submitted completion".to_string(),
            ));
        }

        let expected = booking.version;
        booking.status = BookingStatus::Disputed;
        booking.confirmed_by_requester = false;
        booking.dispute_reason = Some(reason.to_string());
        if !queries::save_booking(&tx, &mut booking, expected)? {
            return Err(stale());
        }
        tx.commit()?;
        booking
    };

    notify::dispatch(
        state,
        &booking.provider_id,
        &format!(
            "{} disputed the completion of \"{}\"",
            requester.name, booking.service_snapshot.title
        ),
        NotifyCategory::BookingDisputed,
        booking_payload(&booking),
        Some(&requester.id),
    )
    .await;

    Ok(booking)
}

/// Fetch a booking for one of its participants or an admin.
pub fn get_for(state: &Arc<AppState>, actor: &User, booking_id: &str) -> Result<Booking, AppError> {
    let db = state.db.lock().unwrap();
    let booking = load_booking(&db, booking_id)?;
    if !booking.is_participant(&actor.id) && !actor.is_admin() {
        return Err(AppError::Unauthorized);
    }
    Ok(booking)
}

pub(crate) fn load_booking(
    conn: &rusqlite::Connection,
    booking_id: &str,
) -> Result<Booking, AppError> {
    queries::get_booking(conn, booking_id)?.ok_or_else(|| AppError::NotFound("booking".to_string()))
}

pub(crate) fn require_actor(expected_id: &str, actor: &User) -> Result<(), AppError> {
    if expected_id != actor.id {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub(crate) fn require_status(
    booking: &Booking,
    expected: BookingStatus,
    action: &str,
) -> Result<(), AppError> {
    if booking.status != expected {
        return Err(AppError::InvalidTransition(format!(
            "cannot {action} a booking in status '{}'",
            booking.status.as_str()
        )));
    }
    Ok(())
}

pub(crate) fn booking_payload(booking: &Booking) -> serde_json::Value {
    serde_json::json!({
        "booking_id": booking.id,
        "service_id": booking.service_id,
        "status": booking.status.as_str(),
    })
}
