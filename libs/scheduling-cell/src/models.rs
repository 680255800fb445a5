// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// One recurring weekly availability window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyWindow {
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: i64,
    /// Idle gap enforced between consecutive slots.
    pub buffer_minutes: i64,
}

/// Date-specific deviation from the recurring schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleException {
    pub date: NaiveDate,
    pub kind: ExceptionKind,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExceptionKind {
    /// Removes availability. Without times the whole day is blacked out.
    Blackout {
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
    },
    /// Adds a one-off window on top of the recurring schedule.
    ExtraWindow {
        start_time: NaiveTime,
        end_time: NaiveTime,
        slot_minutes: i64,
        buffer_minutes: i64,
    },
}

/// A doctor's full schedule: recurring windows plus exceptions.
///
/// Invariant: the effective windows for any given day never overlap after
/// exceptions are applied. Mutated only by the owning doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub doctor_id: Uuid,
    pub weekly_windows: Vec<WeeklyWindow>,
    pub exceptions: Vec<ScheduleException>,
    pub updated_at: DateTime<Utc>,
}

/// A concrete availability window on a specific date, after exceptions.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub slot_minutes: i64,
    pub buffer_minutes: i64,
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Taken,
}

/// A derived bookable slot. Immutable once produced, never cached across a
/// booking decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertScheduleRequest {
    pub weekly_windows: Vec<WeeklyWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddExceptionRequest {
    pub date: NaiveDate,
    pub kind: ExceptionKind,
    pub reason: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SchedulingError {
    #[error("Doctor has no availability record")]
    UnknownDoctor,

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Windows overlap on {0}")]
    OverlappingWindows(String),
}
