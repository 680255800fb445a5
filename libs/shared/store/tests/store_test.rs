use std::sync::Arc;
use std::thread;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use shared_store::{Appointment, AppointmentPatch, AppointmentStatus, AppointmentStore, ReserveRequest, StoreError};

fn slot_request(doctor_id: Uuid, key: &str) -> ReserveRequest {
    let start = Utc.with_ymd_and_hms(2026, 9, 14, 9, 0, 0).unwrap();
    ReserveRequest {
        idempotency_key: key.to_string(),
        doctor_id,
        patient_id: Uuid::new_v4(),
        start_time: start,
        end_time: start + Duration::minutes(30),
    }
}

fn reserve(store: &AppointmentStore, request: ReserveRequest) -> Appointment {
    store.reserve(request).expect("reservation should succeed")
}

#[test]
fn reserve_commits_a_scheduled_appointment() {
    let store = AppointmentStore::new();
    let request = slot_request(Uuid::new_v4(), "key-1");

    let appointment = reserve(&store, request.clone());

    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.version, 1);
    assert_eq!(appointment.doctor_id, request.doctor_id);
    assert_eq!(store.get(appointment.id).unwrap().id, appointment.id);
}

#[test]
fn overlapping_reservation_is_rejected() {
    let store = AppointmentStore::new();
    let doctor_id = Uuid::new_v4();
    let first = slot_request(doctor_id, "key-1");
    reserve(&store, first.clone());

    // Same doctor, partially overlapping window.
    let mut second = slot_request(doctor_id, "key-2");
    second.start_time = first.start_time + Duration::minutes(15);
    second.end_time = second.start_time + Duration::minutes(30);

    assert_matches!(store.reserve(second), Err(StoreError::SlotTaken));
}

#[test]
fn same_slot_for_different_doctors_is_fine() {
    let store = AppointmentStore::new();
    reserve(&store, slot_request(Uuid::new_v4(), "key-1"));
    reserve(&store, slot_request(Uuid::new_v4(), "key-2"));
}

#[test]
fn exactly_one_of_racing_reservations_wins() {
    let store = Arc::new(AppointmentStore::new());
    let doctor_id = Uuid::new_v4();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.reserve(slot_request(doctor_id, &format!("key-{i}"))))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::SlotTaken)))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(losers, 15);
}

#[test]
fn idempotent_replay_returns_the_original_appointment() {
    let store = AppointmentStore::new();
    let doctor_id = Uuid::new_v4();
    let request = slot_request(doctor_id, "replayed");

    let first = reserve(&store, request.clone());
    let second = reserve(&store, request);

    assert_eq!(first.id, second.id);
    assert_eq!(store.booked_ranges(doctor_id, first.start_time, first.end_time).len(), 1);
}

#[test]
fn replayed_key_with_different_slot_is_rejected() {
    let store = AppointmentStore::new();
    let doctor_id = Uuid::new_v4();
    let request = slot_request(doctor_id, "replayed");
    reserve(&store, request.clone());

    let mut altered = request;
    altered.start_time = altered.start_time + Duration::hours(2);
    altered.end_time = altered.end_time + Duration::hours(2);

    assert_matches!(store.reserve(altered), Err(StoreError::IdempotencyMismatch));
}

#[test]
fn replayed_key_with_a_different_doctor_is_rejected() {
    let store = AppointmentStore::new();
    let request = slot_request(Uuid::new_v4(), "same-key");
    reserve(&store, request.clone());

    let mut other_doctor = request;
    other_doctor.doctor_id = Uuid::new_v4();

    assert_matches!(
        store.reserve(other_doctor),
        Err(StoreError::IdempotencyMismatch)
    );
}

#[test]
fn key_from_a_failed_reservation_stays_usable() {
    let store = AppointmentStore::new();
    let doctor_id = Uuid::new_v4();
    reserve(&store, slot_request(doctor_id, "winner"));

    // Loses the slot race; the failure must not burn the key.
    assert_matches!(
        store.reserve(slot_request(doctor_id, "contended")),
        Err(StoreError::SlotTaken)
    );

    reserve(&store, slot_request(Uuid::new_v4(), "contended"));
}

#[test]
fn versioned_update_rejects_stale_versions() {
    let store = AppointmentStore::new();
    let appointment = reserve(&store, slot_request(Uuid::new_v4(), "key-1"));

    let confirmed = store
        .apply(
            appointment.id,
            appointment.version,
            AppointmentPatch::status(AppointmentStatus::Confirmed),
        )
        .unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(confirmed.version, 2);

    // Second writer still holding version 1.
    let stale = store.apply(
        appointment.id,
        appointment.version,
        AppointmentPatch::status(AppointmentStatus::Cancelled),
    );
    assert_matches!(stale, Err(StoreError::VersionConflict { expected: 1, actual: 2 }));
}

#[test]
fn terminal_appointment_frees_its_slot() {
    let store = AppointmentStore::new();
    let doctor_id = Uuid::new_v4();
    let request = slot_request(doctor_id, "key-1");
    let appointment = reserve(&store, request.clone());

    let mut patch = AppointmentPatch::status(AppointmentStatus::Cancelled);
    patch.cancellation_reason = Some("patient request".to_string());
    store.apply(appointment.id, appointment.version, patch).unwrap();

    // The record survives as audit but the slot is bookable again.
    let survivor = store.get(appointment.id).unwrap();
    assert_eq!(survivor.status, AppointmentStatus::Cancelled);
    assert_eq!(survivor.cancellation_reason.as_deref(), Some("patient request"));

    let mut rebook = slot_request(doctor_id, "key-2");
    rebook.patient_id = Uuid::new_v4();
    assert!(store.reserve(rebook).is_ok());
}

#[test]
fn unknown_appointment_is_not_found() {
    let store = AppointmentStore::new();
    assert_matches!(store.get(Uuid::new_v4()), Err(StoreError::NotFound));
    assert_matches!(
        store.apply(Uuid::new_v4(), 1, AppointmentPatch::default()),
        Err(StoreError::NotFound)
    );
}
