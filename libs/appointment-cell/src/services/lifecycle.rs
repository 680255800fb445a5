// libs/appointment-cell/src/services/lifecycle.rs
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use shared_config::CoreConfig;
use shared_store::{Appointment, AppointmentPatch, AppointmentStatus, AppointmentStore, StoreError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AppointmentEvent, TransitionError};
use crate::services::notify::{NotificationDispatcher, NotificationEvent};

/// The appointment state machine, as a pure function.
///
/// Statuses never skip: an appointment reaches `InProgress` only through
/// `Confirmed`, and only an in-progress consultation can complete. Cancelling
/// an in-progress consultation is not a thing; operators force-end it
/// instead, which records an abnormal completion.
pub fn next_status(
    status: AppointmentStatus,
    event: &AppointmentEvent,
) -> Result<AppointmentStatus, TransitionError> {
    use AppointmentStatus::*;

    match (status, event) {
        (Scheduled, AppointmentEvent::Confirm) => Ok(Confirmed),
        (Scheduled | Confirmed, AppointmentEvent::Cancel { .. }) => Ok(Cancelled),
        (Scheduled | Confirmed, AppointmentEvent::MarkNoShow) => Ok(NoShow),
        (Confirmed, AppointmentEvent::Start { .. }) => Ok(InProgress),
        (InProgress, AppointmentEvent::Complete { .. }) => Ok(Completed),
        (from, event) => Err(TransitionError::IllegalTransition {
            from,
            event: event.to_string(),
        }),
    }
}

/// Time-based thresholds for the scheduler-driven sweep.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleRules {
    pub no_show_grace: Duration,
    pub auto_complete_grace: Duration,
    /// How far before the scheduled start the starting-soon reminder fires.
    pub reminder_lead: Duration,
}

impl LifecycleRules {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            no_show_grace: Duration::minutes(config.no_show_grace_minutes),
            auto_complete_grace: Duration::minutes(config.auto_complete_grace_minutes),
            reminder_lead: Duration::minutes(config.join_window_minutes),
        }
    }
}

/// Applies state machine events through the store's versioned update.
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<AppointmentStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    rules: LifecycleRules,
    /// Appointments already sent a starting-soon reminder. Shared across
    /// clones so the sweep reminds at most once per appointment.
    reminded: Arc<Mutex<HashSet<Uuid>>>,
}

impl LifecycleService {
    pub fn new(
        store: Arc<AppointmentStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        rules: LifecycleRules,
    ) -> Self {
        Self {
            store,
            dispatcher,
            rules,
            reminded: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn get(&self, appointment_id: Uuid) -> Result<Appointment, TransitionError> {
        self.store
            .get(appointment_id)
            .map_err(|_| TransitionError::NotFound)
    }

    /// Apply one event at the version the caller read.
    ///
    /// A concurrent transition between the caller's read and this write
    /// surfaces as [`TransitionError::StaleVersion`]; the caller re-reads and
    /// decides again with fresh data.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        expected_version: u64,
        event: AppointmentEvent,
    ) -> Result<Appointment, TransitionError> {
        let current = self.get(appointment_id)?;
        if current.version != expected_version {
            return Err(TransitionError::StaleVersion {
                expected: expected_version,
                actual: current.version,
            });
        }

        let target = next_status(current.status, &event)?;
        let mut patch = AppointmentPatch::status(target);
        if let AppointmentEvent::Cancel { reason, .. } = &event {
            patch.cancellation_reason = Some(reason.clone());
        }
        if let AppointmentEvent::Complete { abnormal } = &event {
            patch.abnormal_termination = Some(*abnormal);
        }

        let updated = self
            .store
            .apply(appointment_id, expected_version, patch)
            .map_err(|err| match err {
                StoreError::VersionConflict { expected, actual } => {
                    TransitionError::StaleVersion { expected, actual }
                }
                _ => TransitionError::NotFound,
            })?;

        info!(
            "Appointment {} transitioned {} -> {} on {}",
            appointment_id, current.status, updated.status, event
        );
        self.notify_transition(&updated, &event).await;
        Ok(updated)
    }

    /// Sweep every active appointment against the wall clock.
    ///
    /// Driven by an external scheduler; the service itself keeps no timers.
    /// Appointments past their start plus grace with nobody having started
    /// the consultation become no-shows, and consultations still marked
    /// in-progress past their end plus grace are closed as abnormal
    /// completions. A transition lost to a concurrent caller is skipped and
    /// picked up on the next sweep if still relevant.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<Appointment> {
        let active = self.store.active_appointments();
        self.prune_reminders(&active);

        let mut transitioned = Vec::new();
        for appointment in active {
            let event = match appointment.status {
                AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
                    if now > appointment.start_time + self.rules.no_show_grace =>
                {
                    AppointmentEvent::MarkNoShow
                }
                AppointmentStatus::InProgress
                    if now > appointment.end_time + self.rules.auto_complete_grace =>
                {
                    AppointmentEvent::Complete { abnormal: true }
                }
                _ => {
                    self.maybe_remind(&appointment, now).await;
                    continue;
                }
            };
            match self
                .transition(appointment.id, appointment.version, event.clone())
                .await
            {
                Ok(updated) => transitioned.push(updated),
                Err(TransitionError::StaleVersion { .. }) => {
                    warn!(
                        "Appointment {} changed under the sweep, skipping {}",
                        appointment.id, event
                    );
                }
                Err(err) => {
                    warn!("Sweep transition failed for {}: {}", appointment.id, err);
                }
            }
        }
        transitioned
    }

    /// Fire the starting-soon reminder once a confirmed appointment enters
    /// the join window, at most once per appointment.
    async fn maybe_remind(&self, appointment: &Appointment, now: DateTime<Utc>) {
        if appointment.status != AppointmentStatus::Confirmed
            || now < appointment.start_time - self.rules.reminder_lead
            || now >= appointment.start_time
        {
            return;
        }
        {
            let mut reminded = self.reminded.lock().expect("reminder set poisoned");
            if !reminded.insert(appointment.id) {
                return;
            }
        }
        self.dispatcher
            .dispatch(NotificationEvent::AppointmentStartingSoon {
                appointment_id: appointment.id,
                start_time: appointment.start_time,
            })
            .await;
    }

    fn prune_reminders(&self, active: &[Appointment]) {
        let active_ids: HashSet<Uuid> = active.iter().map(|a| a.id).collect();
        self.reminded
            .lock()
            .expect("reminder set poisoned")
            .retain(|id| active_ids.contains(id));
    }

    async fn notify_transition(&self, appointment: &Appointment, event: &AppointmentEvent) {
        let notification = match (appointment.status, event) {
            (AppointmentStatus::Confirmed, _) => Some(NotificationEvent::AppointmentConfirmed {
                appointment_id: appointment.id,
            }),
            (AppointmentStatus::Cancelled, AppointmentEvent::Cancel { reason, .. }) => {
                Some(NotificationEvent::AppointmentCancelled {
                    appointment_id: appointment.id,
                    reason: reason.clone(),
                })
            }
            (AppointmentStatus::Completed, AppointmentEvent::Complete { abnormal }) => {
                Some(NotificationEvent::ConsultationEnded {
                    appointment_id: appointment.id,
                    abnormal: *abnormal,
                })
            }
            _ => None,
        };
        if let Some(notification) = notification {
            self.dispatcher.dispatch(notification).await;
        }
    }
}
