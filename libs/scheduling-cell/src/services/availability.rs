// libs/scheduling-cell/src/services/availability.rs
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    DoctorAvailability, EffectiveWindow, ExceptionKind, ScheduleException, SchedulingError,
    UpsertScheduleRequest, WeeklyWindow,
};

/// In-process registry of doctor schedules.
///
/// Read-mostly: the slot generator and the booking commit-time check read it
/// lock-free apart from the `RwLock`; only the owning doctor mutates it.
#[derive(Default)]
pub struct AvailabilityDirectory {
    schedules: RwLock<HashMap<Uuid, DoctorAvailability>>,
}

impl AvailabilityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a doctor's recurring weekly schedule, keeping existing exceptions.
    pub fn upsert_schedule(
        &self,
        doctor_id: Uuid,
        request: UpsertScheduleRequest,
    ) -> Result<DoctorAvailability, SchedulingError> {
        debug!("Upserting schedule for doctor {}", doctor_id);

        for window in &request.weekly_windows {
            validate_window(window)?;
        }

        let mut schedules = self.schedules.write().expect("schedule map poisoned");
        let exceptions = schedules
            .get(&doctor_id)
            .map(|existing| existing.exceptions.clone())
            .unwrap_or_default();

        let candidate = DoctorAvailability {
            doctor_id,
            weekly_windows: request.weekly_windows,
            exceptions,
            updated_at: Utc::now(),
        };
        validate_schedule(&candidate)?;

        schedules.insert(doctor_id, candidate.clone());
        Ok(candidate)
    }

    /// Record a date-specific exception (blackout or extra window).
    pub fn add_exception(
        &self,
        doctor_id: Uuid,
        exception: ScheduleException,
    ) -> Result<DoctorAvailability, SchedulingError> {
        debug!(
            "Adding schedule exception for doctor {} on {}",
            doctor_id, exception.date
        );

        if let ExceptionKind::ExtraWindow {
            start_time,
            end_time,
            slot_minutes,
            buffer_minutes,
        } = &exception.kind
        {
            validate_window(&WeeklyWindow {
                day_of_week: 0,
                start_time: *start_time,
                end_time: *end_time,
                slot_minutes: *slot_minutes,
                buffer_minutes: *buffer_minutes,
            })?;
        }
        if let ExceptionKind::Blackout {
            start_time: Some(start),
            end_time: Some(end),
        } = &exception.kind
        {
            if start >= end {
                return Err(SchedulingError::InvalidWindow(
                    "Blackout start must be before end".to_string(),
                ));
            }
        }

        let mut schedules = self.schedules.write().expect("schedule map poisoned");
        let mut candidate = schedules
            .get(&doctor_id)
            .cloned()
            .ok_or(SchedulingError::UnknownDoctor)?;
        candidate.exceptions.push(exception);
        candidate.updated_at = Utc::now();
        validate_schedule(&candidate)?;

        schedules.insert(doctor_id, candidate.clone());
        Ok(candidate)
    }

    pub fn get(&self, doctor_id: Uuid) -> Result<DoctorAvailability, SchedulingError> {
        self.schedules
            .read()
            .expect("schedule map poisoned")
            .get(&doctor_id)
            .cloned()
            .ok_or(SchedulingError::UnknownDoctor)
    }

    /// Whether `[start, end)` lies inside a currently valid availability
    /// window. The booking path calls this at commit time, closing the race
    /// where availability changes between slot generation and booking.
    pub fn window_covers(
        &self,
        doctor_id: Uuid,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Result<bool, SchedulingError> {
        let schedule = self.get(doctor_id)?;
        let covered = effective_windows(&schedule, start.date_naive())
            .iter()
            .any(|window| window.start <= start && end <= window.end);
        if !covered {
            warn!(
                "Slot [{}, {}) is outside doctor {}'s current availability",
                start, end, doctor_id
            );
        }
        Ok(covered)
    }
}

fn validate_window(window: &WeeklyWindow) -> Result<(), SchedulingError> {
    if window.day_of_week > 6 {
        return Err(SchedulingError::InvalidWindow(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }
    if window.start_time >= window.end_time {
        return Err(SchedulingError::InvalidWindow(
            "Start time must be before end time".to_string(),
        ));
    }
    if window.slot_minutes <= 0 {
        return Err(SchedulingError::InvalidWindow(
            "Slot duration must be positive".to_string(),
        ));
    }
    if window.buffer_minutes < 0 {
        return Err(SchedulingError::InvalidWindow(
            "Buffer must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Checks the schedule invariant: no two effective windows overlap on any day.
fn validate_schedule(schedule: &DoctorAvailability) -> Result<(), SchedulingError> {
    // Recurring windows checked per weekday.
    for day in 0u8..7 {
        let mut windows: Vec<&WeeklyWindow> = schedule
            .weekly_windows
            .iter()
            .filter(|w| w.day_of_week == day)
            .collect();
        windows.sort_by_key(|w| w.start_time);
        for pair in windows.windows(2) {
            if pair[1].start_time < pair[0].end_time {
                return Err(SchedulingError::OverlappingWindows(format!("weekday {}", day)));
            }
        }
    }

    // Dates carrying exceptions checked against the materialized result.
    for exception in &schedule.exceptions {
        let windows = effective_windows(schedule, exception.date);
        for pair in windows.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(SchedulingError::OverlappingWindows(
                    exception.date.to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Materialize the availability windows for one date: recurring windows for
/// that weekday, minus blackouts, plus extra windows, ordered by start.
pub fn effective_windows(schedule: &DoctorAvailability, date: NaiveDate) -> Vec<EffectiveWindow> {
    let weekday = date.weekday().num_days_from_sunday() as u8;

    let mut windows: Vec<EffectiveWindow> = schedule
        .weekly_windows
        .iter()
        .filter(|w| w.day_of_week == weekday)
        .map(|w| EffectiveWindow {
            start: date.and_time(w.start_time).and_utc(),
            end: date.and_time(w.end_time).and_utc(),
            slot_minutes: w.slot_minutes,
            buffer_minutes: w.buffer_minutes,
        })
        .collect();

    for exception in schedule.exceptions.iter().filter(|e| e.date == date) {
        match &exception.kind {
            ExceptionKind::Blackout {
                start_time: None,
                end_time: None,
            } => windows.clear(),
            ExceptionKind::Blackout {
                start_time,
                end_time,
            } => {
                let blackout_start = date
                    .and_time(start_time.unwrap_or(chrono::NaiveTime::MIN))
                    .and_utc();
                let blackout_end = match end_time {
                    Some(end) => date.and_time(*end).and_utc(),
                    None => date.and_hms_opt(23, 59, 59).unwrap().and_utc(),
                };
                windows = windows
                    .into_iter()
                    .flat_map(|w| subtract(w, blackout_start, blackout_end))
                    .collect();
            }
            ExceptionKind::ExtraWindow {
                start_time,
                end_time,
                slot_minutes,
                buffer_minutes,
            } => windows.push(EffectiveWindow {
                start: date.and_time(*start_time).and_utc(),
                end: date.and_time(*end_time).and_utc(),
                slot_minutes: *slot_minutes,
                buffer_minutes: *buffer_minutes,
            }),
        }
    }

    windows.sort_by_key(|w| w.start);
    windows
}

fn subtract(
    window: EffectiveWindow,
    cut_start: chrono::DateTime<Utc>,
    cut_end: chrono::DateTime<Utc>,
) -> Vec<EffectiveWindow> {
    if cut_end <= window.start || cut_start >= window.end {
        return vec![window];
    }
    let mut pieces = Vec::new();
    if window.start < cut_start {
        pieces.push(EffectiveWindow {
            end: cut_start,
            ..window.clone()
        });
    }
    if cut_end < window.end {
        pieces.push(EffectiveWindow {
            start: cut_end,
            ..window
        });
    }
    pieces
}
