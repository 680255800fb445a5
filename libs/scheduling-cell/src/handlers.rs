// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::AuthUser;
use shared_models::error::AppError;

use crate::models::{AddExceptionRequest, ScheduleException, SchedulingError, UpsertScheduleRequest};
use crate::SchedulingState;

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub include_taken: bool,
}

/// Replace the recurring weekly schedule. Doctors manage only their own.
#[axum::debug_handler]
pub async fn upsert_schedule(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpsertScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_schedule_owner(&user, doctor_id)?;

    let schedule = state
        .directory
        .upsert_schedule(doctor_id, request)
        .map_err(scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(_user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let schedule = state.directory.get(doctor_id).map_err(scheduling_error)?;

    Ok(Json(json!({
        "schedule": schedule
    })))
}

/// Record a blackout or an extra window for a specific date.
#[axum::debug_handler]
pub async fn add_exception(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AddExceptionRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_schedule_owner(&user, doctor_id)?;

    let schedule = state
        .directory
        .add_exception(
            doctor_id,
            ScheduleException {
                date: request.date,
                kind: request.kind,
                reason: request.reason,
            },
        )
        .map_err(scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

/// List bookable slots for a doctor over a bounded range.
#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<SchedulingState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(_user): Extension<AuthUser>,
    Query(params): Query<SlotQueryParams>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .generator
        .generate_slots(doctor_id, params.from, params.to)
        .map_err(scheduling_error)?;

    let slots: Vec<_> = if params.include_taken {
        slots.collect()
    } else {
        slots.available().collect()
    };

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "slots": slots
    })))
}

fn authorize_schedule_owner(user: &AuthUser, doctor_id: Uuid) -> Result<(), AppError> {
    let is_owner = user.is_doctor() && user.id == doctor_id;
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the owning doctor may modify this schedule".to_string(),
        ));
    }
    Ok(())
}

fn scheduling_error(error: SchedulingError) -> AppError {
    match error {
        SchedulingError::UnknownDoctor => {
            AppError::NotFound("Doctor has no availability record".to_string())
        }
        SchedulingError::InvalidRange(msg) => AppError::BadRequest(msg),
        SchedulingError::InvalidWindow(msg) => AppError::ValidationError(msg),
        SchedulingError::OverlappingWindows(msg) => {
            AppError::ValidationError(format!("Windows overlap on {}", msg))
        }
    }
}
