// libs/session-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::AuthUser;
use shared_models::error::AppError;

use crate::models::{EndRequest, PublishRequest, SessionError};
use crate::SessionState;

/// Join the consultation for an appointment and receive a scoped media token.
///
/// Session events queue in the participant's bounded inbox from this point
/// on and are collected through the events endpoint; media flows through the
/// provider using the issued token.
#[axum::debug_handler]
pub async fn join_session(
    State(state): State<Arc<SessionState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let handle = state
        .coordinator
        .join(appointment_id, &user)
        .await
        .map_err(session_error)?;
    let snapshot = state
        .coordinator
        .snapshot(appointment_id, &user)
        .map_err(session_error)?;

    Ok(Json(json!({
        "success": true,
        "media_token": handle.media_token,
        "session": snapshot
    })))
}

/// Collect the caller's queued session events, in session order.
#[axum::debug_handler]
pub async fn poll_events(
    State(state): State<Arc<SessionState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let events = state
        .coordinator
        .drain_events(appointment_id, &user)
        .map_err(session_error)?;

    Ok(Json(json!({
        "events": events
    })))
}

/// Relay a signaling payload to the other participants, in session order.
#[axum::debug_handler]
pub async fn publish(
    State(state): State<Arc<SessionState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<Value>, AppError> {
    let seq = state
        .coordinator
        .publish(appointment_id, &user, request.payload)
        .map_err(session_error)?;

    Ok(Json(json!({
        "success": true,
        "seq": seq
    })))
}

#[axum::debug_handler]
pub async fn leave_session(
    State(state): State<Arc<SessionState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    state
        .coordinator
        .leave(appointment_id, &user)
        .await
        .map_err(session_error)?;

    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn end_session(
    State(state): State<Arc<SessionState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<EndRequest>,
) -> Result<Json<Value>, AppError> {
    state
        .coordinator
        .end_call(appointment_id, &user, request.reason)
        .await
        .map_err(session_error)?;

    Ok(Json(json!({ "success": true })))
}

fn session_error(error: SessionError) -> AppError {
    match error {
        SessionError::UnknownAppointment => {
            AppError::NotFound("Appointment not found".to_string())
        }
        SessionError::NotAParticipant => {
            AppError::Forbidden("Not a participant in this appointment".to_string())
        }
        SessionError::NotJoinable(msg) => AppError::Conflict(msg),
        SessionError::NoActiveSession => {
            AppError::Conflict("No active session for this appointment".to_string())
        }
        SessionError::BackpressureExceeded => {
            AppError::Backpressure("A participant queue is full".to_string())
        }
        SessionError::TokenIssuance(msg) => AppError::Internal(msg),
    }
}
