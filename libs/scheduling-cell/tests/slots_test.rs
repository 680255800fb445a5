use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use scheduling_cell::models::{SchedulingError, SlotStatus, UpsertScheduleRequest, WeeklyWindow};
use scheduling_cell::services::availability::AvailabilityDirectory;
use scheduling_cell::services::slots::SlotGenerator;
use shared_store::{AppointmentStore, ReserveRequest};

const DAY: NaiveDate = match NaiveDate::from_ymd_opt(2026, 9, 14) {
    Some(date) => date,
    None => panic!("bad date"),
};

struct Fixture {
    store: Arc<AppointmentStore>,
    generator: SlotGenerator,
    doctor_id: Uuid,
}

impl Fixture {
    fn new(windows: Vec<WeeklyWindow>) -> Self {
        let directory = Arc::new(AvailabilityDirectory::new());
        let store = Arc::new(AppointmentStore::new());
        let doctor_id = Uuid::new_v4();
        directory
            .upsert_schedule(doctor_id, UpsertScheduleRequest { weekly_windows: windows })
            .unwrap();
        let generator = SlotGenerator::new(directory, Arc::clone(&store), 60);
        Self {
            store,
            generator,
            doctor_id,
        }
    }

    fn day_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = DAY.and_hms_opt(0, 0, 0).unwrap().and_utc();
        (from, from + Duration::days(1))
    }
}

fn window_on(date: NaiveDate, start: &str, end: &str, slot: i64, buffer: i64) -> WeeklyWindow {
    WeeklyWindow {
        day_of_week: date.weekday().num_days_from_sunday() as u8,
        start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
        end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
        slot_minutes: slot,
        buffer_minutes: buffer,
    }
}

#[test]
fn single_window_yields_a_single_slot() {
    let fixture = Fixture::new(vec![window_on(DAY, "09:00", "09:30", 30, 0)]);
    let (from, to) = fixture.day_range();

    let slots: Vec<_> = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, to)
        .unwrap()
        .available()
        .collect();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, DAY.and_hms_opt(9, 0, 0).unwrap().and_utc());
    assert_eq!(slots[0].end_time, DAY.and_hms_opt(9, 30, 0).unwrap().and_utc());
}

#[test]
fn booked_slot_disappears_from_the_available_view() {
    let fixture = Fixture::new(vec![window_on(DAY, "09:00", "09:30", 30, 0)]);
    let (from, to) = fixture.day_range();

    let slot = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, to)
        .unwrap()
        .available()
        .next()
        .unwrap();

    fixture
        .store
        .reserve(ReserveRequest {
            idempotency_key: "k".to_string(),
            doctor_id: fixture.doctor_id,
            patient_id: Uuid::new_v4(),
            start_time: slot.start_time,
            end_time: slot.end_time,
        })
        .unwrap();

    let available: Vec<_> = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, to)
        .unwrap()
        .available()
        .collect();
    assert!(available.is_empty());

    // The slot still exists, tagged taken.
    let all: Vec<_> = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, to)
        .unwrap()
        .collect();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, SlotStatus::Taken);
}

#[test]
fn buffer_between_slots_is_honored() {
    // 09:00-10:00 with 20-minute slots and 10-minute buffer:
    // 09:00-09:20 and 09:30-09:50 fit; a third would end past the window.
    let fixture = Fixture::new(vec![window_on(DAY, "09:00", "10:00", 20, 10)]);
    let (from, to) = fixture.day_range();

    let slots: Vec<_> = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, to)
        .unwrap()
        .collect();

    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].start_time, DAY.and_hms_opt(9, 0, 0).unwrap().and_utc());
    assert_eq!(slots[1].start_time, DAY.and_hms_opt(9, 30, 0).unwrap().and_utc());
}

#[test]
fn slots_are_ordered_and_restartable() {
    let fixture = Fixture::new(vec![
        window_on(DAY, "13:00", "15:00", 30, 0),
        window_on(DAY, "09:00", "11:00", 30, 0),
    ]);
    let (from, to) = fixture.day_range();

    let slots = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, to)
        .unwrap();

    let first_pass: Vec<_> = slots.clone().collect();
    let second_pass: Vec<_> = slots.collect();
    assert_eq!(first_pass.len(), second_pass.len());

    for pair in first_pass.windows(2) {
        assert!(pair[0].start_time < pair[1].start_time);
    }
    assert_eq!(first_pass[0].start_time, second_pass[0].start_time);
}

#[test]
fn range_beyond_the_horizon_is_rejected() {
    let fixture = Fixture::new(vec![window_on(DAY, "09:00", "10:00", 30, 0)]);
    let from = DAY.and_hms_opt(0, 0, 0).unwrap().and_utc();

    let result = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, from + Duration::days(61));
    assert_matches!(result, Err(SchedulingError::InvalidRange(_)));
}

#[test]
fn inverted_range_is_rejected() {
    let fixture = Fixture::new(vec![window_on(DAY, "09:00", "10:00", 30, 0)]);
    let from = DAY.and_hms_opt(0, 0, 0).unwrap().and_utc();

    let result = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, from - Duration::hours(1));
    assert_matches!(result, Err(SchedulingError::InvalidRange(_)));
}

#[test]
fn unknown_doctor_is_rejected() {
    let fixture = Fixture::new(vec![window_on(DAY, "09:00", "10:00", 30, 0)]);
    let (from, to) = fixture.day_range();

    let result = fixture.generator.generate_slots(Uuid::new_v4(), from, to);
    assert_matches!(result, Err(SchedulingError::UnknownDoctor));
}

#[test]
fn partially_booked_day_keeps_the_remaining_slots() {
    let fixture = Fixture::new(vec![window_on(DAY, "09:00", "11:00", 30, 0)]);
    let (from, to) = fixture.day_range();

    fixture
        .store
        .reserve(ReserveRequest {
            idempotency_key: "k".to_string(),
            doctor_id: fixture.doctor_id,
            patient_id: Uuid::new_v4(),
            start_time: DAY.and_hms_opt(9, 30, 0).unwrap().and_utc(),
            end_time: DAY.and_hms_opt(10, 0, 0).unwrap().and_utc(),
        })
        .unwrap();

    let available: Vec<_> = fixture
        .generator
        .generate_slots(fixture.doctor_id, from, to)
        .unwrap()
        .available()
        .collect();

    let starts: Vec<_> = available
        .iter()
        .map(|slot| slot.start_time.time().format("%H:%M").to_string())
        .collect();
    assert_eq!(starts, vec!["09:00", "10:00", "10:30"]);
}
