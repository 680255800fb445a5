use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a committed appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Terminal statuses no longer hold their time slot.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// A committed appointment. The single source of truth for "is this slot taken".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    /// Optimistic-concurrency counter, incremented on every transition.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
    /// Set when an in-progress consultation was force-ended by an operator.
    pub abnormal_termination: bool,
}

impl Appointment {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}

/// Slot reservation request committed by [`crate::AppointmentStore::reserve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Client-supplied key making the booking replay-safe.
    pub idempotency_key: String,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ReserveRequest {
    /// Whether a stored appointment was created from these exact arguments.
    pub fn matches(&self, appointment: &Appointment) -> bool {
        appointment.doctor_id == self.doctor_id
            && appointment.patient_id == self.patient_id
            && appointment.start_time == self.start_time
            && appointment.end_time == self.end_time
    }
}

/// Field changes applied by a versioned update.
///
/// Status always changes on a transition; the remaining fields are set only
/// when the transition carries them.
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub status: Option<AppointmentStatus>,
    pub cancellation_reason: Option<String>,
    pub abnormal_termination: Option<bool>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
