// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use shared_store::{Appointment, AppointmentStatus};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Client-supplied key; replaying the same key with the same slot
    /// returns the original appointment instead of double-booking.
    pub idempotency_key: String,
    /// Per-call deadline in milliseconds; the configured default applies
    /// when omitted.
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub expected_version: u64,
    pub event: AppointmentEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRequest {
    /// Wall-clock supplied by the external scheduler; defaults to now.
    pub now: Option<DateTime<Utc>>,
}

// ==============================================================================
// STATE MACHINE EVENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    System,
}

/// Inputs to the appointment state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppointmentEvent {
    /// Doctor or payment acknowledges the booking.
    Confirm,
    /// Consultation begins; `forced` marks a doctor-initiated early start.
    Start { forced: bool },
    /// Consultation ends; `abnormal` marks an operator force-end.
    Complete { abnormal: bool },
    /// Either party backs out before the consultation starts.
    Cancel {
        cancelled_by: CancelledBy,
        reason: String,
    },
    /// Consultation window passed without the counterpart joining.
    MarkNoShow,
}

impl fmt::Display for AppointmentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentEvent::Confirm => write!(f, "confirm"),
            AppointmentEvent::Start { forced: true } => write!(f, "start (forced)"),
            AppointmentEvent::Start { forced: false } => write!(f, "start"),
            AppointmentEvent::Complete { abnormal: true } => write!(f, "complete (abnormal)"),
            AppointmentEvent::Complete { abnormal: false } => write!(f, "complete"),
            AppointmentEvent::Cancel { .. } => write!(f, "cancel"),
            AppointmentEvent::MarkNoShow => write!(f, "mark_no_show"),
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BookingError {
    #[error("Appointment slot not available")]
    SlotUnavailable,

    #[error("Idempotency key replayed with different arguments")]
    IdempotencyMismatch,

    #[error("Doctor has no availability record")]
    UnknownDoctor,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Booking deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TransitionError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Stale version: expected {expected}, found {actual}")]
    StaleVersion { expected: u64, actual: u64 },

    #[error("Illegal transition from {from} on {event}")]
    IllegalTransition { from: AppointmentStatus, event: String },
}
