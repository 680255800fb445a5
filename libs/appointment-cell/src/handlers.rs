// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::AuthUser;
use shared_models::error::AppError;
use shared_store::Appointment;

use crate::models::{
    AppointmentEvent, BookAppointmentRequest, BookingError, CancelledBy, TickRequest,
    TransitionError, TransitionRequest,
};
use crate::AppointmentState;

/// Book an appointment. Patients book for themselves; admins book on behalf.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && user.id != request.patient_id {
        return Err(AppError::Forbidden(
            "Patients may only book appointments for themselves".to_string(),
        ));
    }

    let appointment = state
        .booking
        .book_with_deadline(request)
        .await
        .map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .lifecycle
        .get(appointment_id)
        .map_err(transition_error)?;
    authorize_participant(&user, &appointment)?;

    Ok(Json(json!({
        "appointment": appointment
    })))
}

/// Apply one state machine event at the version the caller last read.
#[axum::debug_handler]
pub async fn transition_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .lifecycle
        .get(appointment_id)
        .map_err(transition_error)?;
    authorize_participant(&user, &appointment)?;
    authorize_event(&user, &appointment, &request.event)?;

    let appointment = state
        .lifecycle
        .transition(appointment_id, request.expected_version, request.event)
        .await
        .map_err(transition_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

/// Time-based sweep, driven by the platform scheduler.
#[axum::debug_handler]
pub async fn tick(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<TickRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the platform scheduler may run the sweep".to_string(),
        ));
    }

    let now = request.now.unwrap_or_else(Utc::now);
    let transitioned = state.lifecycle.tick(now).await;

    Ok(Json(json!({
        "success": true,
        "transitioned": transitioned
    })))
}

fn authorize_participant(user: &AuthUser, appointment: &Appointment) -> Result<(), AppError> {
    let is_participant = user.id == appointment.patient_id || user.id == appointment.doctor_id;
    if !is_participant && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not a participant in this appointment".to_string(),
        ));
    }
    Ok(())
}

/// Role checks on top of the participant check. The state machine rules on
/// status come later; this only answers "may this caller fire this event".
fn authorize_event(
    user: &AuthUser,
    appointment: &Appointment,
    event: &AppointmentEvent,
) -> Result<(), AppError> {
    if user.is_admin() {
        return Ok(());
    }
    match event {
        AppointmentEvent::Confirm => {
            if user.id != appointment.doctor_id {
                return Err(AppError::Forbidden(
                    "Only the doctor may confirm an appointment".to_string(),
                ));
            }
        }
        AppointmentEvent::Start { .. } => {
            if user.id != appointment.doctor_id {
                return Err(AppError::Forbidden(
                    "Only the doctor may start a consultation early".to_string(),
                ));
            }
        }
        AppointmentEvent::Cancel { cancelled_by, .. } => {
            let claimed = match cancelled_by {
                CancelledBy::Patient => appointment.patient_id,
                CancelledBy::Doctor => appointment.doctor_id,
                CancelledBy::System => {
                    return Err(AppError::Forbidden(
                        "System cancellations are admin-only".to_string(),
                    ))
                }
            };
            if user.id != claimed {
                return Err(AppError::Forbidden(
                    "Cancellation attribution must match the caller".to_string(),
                ));
            }
        }
        AppointmentEvent::Complete { .. } | AppointmentEvent::MarkNoShow => {
            return Err(AppError::Forbidden(
                "Completion and no-show are system-driven".to_string(),
            ));
        }
    }
    Ok(())
}

fn booking_error(error: BookingError) -> AppError {
    match error {
        BookingError::SlotUnavailable => {
            AppError::Conflict("Appointment slot not available".to_string())
        }
        BookingError::IdempotencyMismatch => {
            AppError::Conflict("Idempotency key replayed with different arguments".to_string())
        }
        BookingError::UnknownDoctor => {
            AppError::NotFound("Doctor has no availability record".to_string())
        }
        BookingError::InvalidTime(msg) => AppError::ValidationError(msg),
        BookingError::DeadlineExceeded => {
            AppError::Timeout("Booking deadline exceeded".to_string())
        }
    }
}

fn transition_error(error: TransitionError) -> AppError {
    match error {
        TransitionError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        TransitionError::StaleVersion { expected, actual } => AppError::Conflict(format!(
            "Stale version: expected {}, found {}",
            expected, actual
        )),
        TransitionError::IllegalTransition { from, event } => AppError::BadRequest(format!(
            "Illegal transition from {} on {}",
            from, event
        )),
    }
}
