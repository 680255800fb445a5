// libs/appointment-cell/src/services/notify.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Events handed to the notification/reminder dispatcher.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    AppointmentBooked {
        appointment_id: Uuid,
        doctor_id: Uuid,
        patient_id: Uuid,
        start_time: DateTime<Utc>,
    },
    AppointmentConfirmed {
        appointment_id: Uuid,
    },
    AppointmentCancelled {
        appointment_id: Uuid,
        reason: String,
    },
    AppointmentStartingSoon {
        appointment_id: Uuid,
        start_time: DateTime<Utc>,
    },
    ConsultationEnded {
        appointment_id: Uuid,
        abnormal: bool,
    },
}

/// Fire-and-forget dispatch to the notification collaborator.
///
/// Delivery failures never roll back core state, so the contract has no
/// error channel at all.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: NotificationEvent);
}

/// Default dispatcher: structured log lines in place of a real delivery
/// backend.
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) {
        info!(
            event = %serde_json::to_string(&event).unwrap_or_else(|_| "unserializable".to_string()),
            "notification dispatched"
        );
    }
}
