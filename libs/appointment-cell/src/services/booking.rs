// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scheduling_cell::services::availability::AvailabilityDirectory;
use shared_config::CoreConfig;
use shared_store::{Appointment, AppointmentStore, ReserveRequest, StoreError};
use tracing::{info, warn};

use crate::models::{BookAppointmentRequest, BookingError};
use crate::services::notify::{NotificationDispatcher, NotificationEvent};

/// The booking transaction manager.
///
/// Availability is re-checked at commit time and the reservation itself is a
/// single atomic step in the store, so a slot shown as free in a stale list
/// can still only be booked once, and only while a real availability window
/// covers it.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<AppointmentStore>,
    availability: Arc<AvailabilityDirectory>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    default_deadline: Duration,
}

impl BookingService {
    pub fn new(
        store: Arc<AppointmentStore>,
        availability: Arc<AvailabilityDirectory>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            store,
            availability,
            dispatcher,
            default_deadline: Duration::from_millis(config.booking_deadline_ms),
        }
    }

    /// Commit a booking, bounded by the caller's deadline.
    ///
    /// The state change inside is all-or-nothing, so a timed-out call leaves
    /// no half-committed reservation behind. The caller still cannot tell
    /// whether the commit landed just before the cutoff; replaying the same
    /// idempotency key resolves that safely.
    pub async fn book_with_deadline(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, BookingError> {
        let deadline = request
            .deadline_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_deadline);
        match tokio::time::timeout(deadline, self.book(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Booking deadline of {:?} exceeded", deadline);
                Err(BookingError::DeadlineExceeded)
            }
        }
    }

    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Appointment, BookingError> {
        if request.end_time <= request.start_time {
            return Err(BookingError::InvalidTime(
                "End time must be after start time".to_string(),
            ));
        }
        if request.start_time <= Utc::now() {
            return Err(BookingError::InvalidTime(
                "Appointments must start in the future".to_string(),
            ));
        }

        let covered = self
            .availability
            .window_covers(request.doctor_id, request.start_time, request.end_time)
            .map_err(|_| BookingError::UnknownDoctor)?;
        if !covered {
            return Err(BookingError::SlotUnavailable);
        }

        let appointment = self
            .store
            .reserve(ReserveRequest {
                idempotency_key: request.idempotency_key,
                doctor_id: request.doctor_id,
                patient_id: request.patient_id,
                start_time: request.start_time,
                end_time: request.end_time,
            })
            .map_err(|err| match err {
                StoreError::SlotTaken => BookingError::SlotUnavailable,
                StoreError::IdempotencyMismatch => BookingError::IdempotencyMismatch,
                other => {
                    warn!("Unexpected reserve failure: {}", other);
                    BookingError::SlotUnavailable
                }
            })?;

        info!(
            "Booked appointment {} for patient {} with doctor {} at {}",
            appointment.id, appointment.patient_id, appointment.doctor_id, appointment.start_time
        );
        self.dispatcher
            .dispatch(NotificationEvent::AppointmentBooked {
                appointment_id: appointment.id,
                doctor_id: appointment.doctor_id,
                patient_id: appointment.patient_id,
                start_time: appointment.start_time,
            })
            .await;
        Ok(appointment)
    }
}
