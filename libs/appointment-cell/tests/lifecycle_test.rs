use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{AppointmentEvent, CancelledBy, TransitionError};
use appointment_cell::services::lifecycle::{next_status, LifecycleRules, LifecycleService};
use appointment_cell::services::notify::{
    NotificationDispatcher, NotificationEvent, TracingDispatcher,
};
use shared_config::CoreConfig;
use shared_store::{Appointment, AppointmentStatus, AppointmentStore, ReserveRequest};

fn service_with_store() -> (LifecycleService, Arc<AppointmentStore>) {
    let store = Arc::new(AppointmentStore::new());
    let service = LifecycleService::new(
        Arc::clone(&store),
        Arc::new(TracingDispatcher),
        LifecycleRules::from_config(&CoreConfig::default()),
    );
    (service, store)
}

fn seed(store: &AppointmentStore) -> Appointment {
    let start = Utc.with_ymd_and_hms(2026, 9, 14, 9, 0, 0).unwrap();
    store
        .reserve(ReserveRequest {
            idempotency_key: Uuid::new_v4().to_string(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            start_time: start,
            end_time: start + Duration::minutes(30),
        })
        .unwrap()
}

fn cancel() -> AppointmentEvent {
    AppointmentEvent::Cancel {
        cancelled_by: CancelledBy::Patient,
        reason: "patient request".to_string(),
    }
}

#[test]
fn transition_table_never_skips_states() {
    use AppointmentStatus::*;

    assert_eq!(next_status(Scheduled, &AppointmentEvent::Confirm), Ok(Confirmed));
    assert_eq!(
        next_status(Confirmed, &AppointmentEvent::Start { forced: false }),
        Ok(InProgress)
    );
    assert_eq!(
        next_status(InProgress, &AppointmentEvent::Complete { abnormal: false }),
        Ok(Completed)
    );

    // Scheduled can neither start nor complete directly.
    assert_matches!(
        next_status(Scheduled, &AppointmentEvent::Start { forced: false }),
        Err(TransitionError::IllegalTransition { .. })
    );
    assert_matches!(
        next_status(Scheduled, &AppointmentEvent::Complete { abnormal: false }),
        Err(TransitionError::IllegalTransition { .. })
    );
}

#[test]
fn in_progress_cannot_be_cancelled_only_force_ended() {
    assert_matches!(
        next_status(AppointmentStatus::InProgress, &cancel()),
        Err(TransitionError::IllegalTransition { .. })
    );
    assert_eq!(
        next_status(
            AppointmentStatus::InProgress,
            &AppointmentEvent::Complete { abnormal: true }
        ),
        Ok(AppointmentStatus::Completed)
    );
}

#[test]
fn terminal_states_accept_nothing() {
    use AppointmentStatus::*;

    for status in [Completed, Cancelled, NoShow] {
        for event in [
            AppointmentEvent::Confirm,
            AppointmentEvent::Start { forced: false },
            AppointmentEvent::Complete { abnormal: false },
            cancel(),
            AppointmentEvent::MarkNoShow,
        ] {
            assert_matches!(
                next_status(status, &event),
                Err(TransitionError::IllegalTransition { .. })
            );
        }
    }
}

#[tokio::test]
async fn transition_bumps_version_and_records_the_reason() {
    let (service, store) = service_with_store();
    let appointment = seed(&store);

    let confirmed = service
        .transition(appointment.id, 1, AppointmentEvent::Confirm)
        .await
        .unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(confirmed.version, 2);

    let cancelled = service.transition(appointment.id, 2, cancel()).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.version, 3);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("patient request"));
}

#[tokio::test]
async fn stale_version_reports_the_actual_version() {
    let (service, store) = service_with_store();
    let appointment = seed(&store);

    service
        .transition(appointment.id, 1, AppointmentEvent::Confirm)
        .await
        .unwrap();

    // A second caller still holding version 1 loses cleanly.
    let result = service.transition(appointment.id, 1, cancel()).await;
    assert_matches!(
        result,
        Err(TransitionError::StaleVersion {
            expected: 1,
            actual: 2
        })
    );
}

#[tokio::test]
async fn unknown_appointment_is_not_found() {
    let (service, _store) = service_with_store();
    assert_matches!(
        service
            .transition(Uuid::new_v4(), 1, AppointmentEvent::Confirm)
            .await,
        Err(TransitionError::NotFound)
    );
}

#[tokio::test]
async fn forced_completion_marks_abnormal_termination() {
    let (service, store) = service_with_store();
    let appointment = seed(&store);

    service
        .transition(appointment.id, 1, AppointmentEvent::Confirm)
        .await
        .unwrap();
    service
        .transition(appointment.id, 2, AppointmentEvent::Start { forced: true })
        .await
        .unwrap();
    let completed = service
        .transition(appointment.id, 3, AppointmentEvent::Complete { abnormal: true })
        .await
        .unwrap();

    assert_eq!(completed.status, AppointmentStatus::Completed);
    assert!(completed.abnormal_termination);
}

#[tokio::test]
async fn sweep_marks_unstarted_appointments_as_no_show_after_grace() {
    let (service, store) = service_with_store();
    let appointment = seed(&store);
    service
        .transition(appointment.id, 1, AppointmentEvent::Confirm)
        .await
        .unwrap();

    // One minute shy of the grace period: nothing happens.
    let early = appointment.start_time + Duration::minutes(29);
    assert!(service.tick(early).await.is_empty());
    assert_eq!(
        store.get(appointment.id).unwrap().status,
        AppointmentStatus::Confirmed
    );

    let late = appointment.start_time + Duration::minutes(31);
    let transitioned = service.tick(late).await;
    assert_eq!(transitioned.len(), 1);
    assert_eq!(transitioned[0].status, AppointmentStatus::NoShow);
}

#[tokio::test]
async fn sweep_closes_overrunning_consultations_as_abnormal() {
    let (service, store) = service_with_store();
    let appointment = seed(&store);
    service
        .transition(appointment.id, 1, AppointmentEvent::Confirm)
        .await
        .unwrap();
    service
        .transition(appointment.id, 2, AppointmentEvent::Start { forced: false })
        .await
        .unwrap();

    let late = appointment.end_time + Duration::minutes(31);
    let transitioned = service.tick(late).await;

    assert_eq!(transitioned.len(), 1);
    assert_eq!(transitioned[0].status, AppointmentStatus::Completed);
    assert!(transitioned[0].abnormal_termination);
}

#[derive(Default)]
struct RecordingDispatcher {
    events: std::sync::Mutex<Vec<NotificationEvent>>,
}

#[async_trait::async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingDispatcher {
    fn reminder_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, NotificationEvent::AppointmentStartingSoon { .. }))
            .count()
    }
}

#[tokio::test]
async fn sweep_fires_the_starting_soon_reminder_once() {
    let store = Arc::new(AppointmentStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = LifecycleService::new(
        Arc::clone(&store),
        dispatcher.clone(),
        LifecycleRules::from_config(&CoreConfig::default()),
    );
    let appointment = seed(&store);
    service
        .transition(appointment.id, 1, AppointmentEvent::Confirm)
        .await
        .unwrap();

    // Outside the join window: nothing fires.
    assert!(service
        .tick(appointment.start_time - Duration::minutes(20))
        .await
        .is_empty());
    assert_eq!(dispatcher.reminder_count(), 0);

    // Inside the window: exactly one reminder, no transition.
    assert!(service
        .tick(appointment.start_time - Duration::minutes(10))
        .await
        .is_empty());
    assert_eq!(dispatcher.reminder_count(), 1);

    // Sweeping again does not remind twice.
    assert!(service
        .tick(appointment.start_time - Duration::minutes(5))
        .await
        .is_empty());
    assert_eq!(dispatcher.reminder_count(), 1);
}

#[tokio::test]
async fn sweep_leaves_terminal_appointments_alone() {
    let (service, store) = service_with_store();
    let appointment = seed(&store);
    service.transition(appointment.id, 1, cancel()).await.unwrap();

    let far_future = appointment.end_time + Duration::days(7);
    assert!(service.tick(far_future).await.is_empty());
    assert_eq!(
        store.get(appointment.id).unwrap().status,
        AppointmentStatus::Cancelled
    );
}
