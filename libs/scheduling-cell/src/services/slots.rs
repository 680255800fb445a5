// libs/scheduling-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use shared_store::AppointmentStore;

use crate::models::{EffectiveWindow, SchedulingError, Slot, SlotStatus};
use crate::services::availability::{effective_windows, AvailabilityDirectory};

/// Derives bookable slots from availability and existing appointments.
pub struct SlotGenerator {
    directory: Arc<AvailabilityDirectory>,
    store: Arc<AppointmentStore>,
    horizon_days: i64,
}

impl SlotGenerator {
    pub fn new(
        directory: Arc<AvailabilityDirectory>,
        store: Arc<AppointmentStore>,
        horizon_days: i64,
    ) -> Self {
        Self {
            directory,
            store,
            horizon_days,
        }
    }

    /// Compute the slot sequence for one doctor over a date range.
    ///
    /// The result is a lazy, restartable iterator ordered by start time,
    /// reflecting a snapshot of the doctor's non-terminal appointments at
    /// call time. No reservation is made; callers re-validate at booking.
    pub fn generate_slots(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Slots, SchedulingError> {
        if to <= from {
            return Err(SchedulingError::InvalidRange(
                "Range end must be after range start".to_string(),
            ));
        }
        if to - from > Duration::days(self.horizon_days) {
            return Err(SchedulingError::InvalidRange(format!(
                "Range exceeds the {}-day horizon",
                self.horizon_days
            )));
        }

        let schedule = self.directory.get(doctor_id)?;

        let mut windows: Vec<EffectiveWindow> = Vec::new();
        let mut date = from.date_naive();
        let last = to.date_naive();
        while date <= last {
            for window in effective_windows(&schedule, date) {
                // Clip to the requested range; partial windows still yield
                // whatever whole slots fit.
                if window.end > from && window.start < to {
                    windows.push(EffectiveWindow {
                        start: window.start.max(from),
                        end: window.end.min(to),
                        ..window
                    });
                }
            }
            date = date.succ_opt().expect("date overflow");
        }
        windows.sort_by_key(|w| w.start);

        let booked: Vec<(DateTime<Utc>, DateTime<Utc>)> = self
            .store
            .booked_ranges(doctor_id, from, to)
            .into_iter()
            .map(|appointment| (appointment.start_time, appointment.end_time))
            .collect();

        debug!(
            "Slot plan for doctor {}: {} windows, {} booked ranges",
            doctor_id,
            windows.len(),
            booked.len()
        );

        Ok(Slots {
            doctor_id,
            windows,
            booked: Arc::new(booked),
            window_index: 0,
            cursor: None,
        })
    }
}

/// Lazy slot sequence produced by [`SlotGenerator::generate_slots`].
///
/// Plain value: cloning restarts the sequence from the beginning.
#[derive(Debug, Clone)]
pub struct Slots {
    doctor_id: Uuid,
    windows: Vec<EffectiveWindow>,
    booked: Arc<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    window_index: usize,
    cursor: Option<DateTime<Utc>>,
}

impl Iterator for Slots {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        loop {
            let window = self.windows.get(self.window_index)?;
            let start = self.cursor.unwrap_or(window.start);
            let end = start + Duration::minutes(window.slot_minutes);

            if end > window.end {
                self.window_index += 1;
                self.cursor = None;
                continue;
            }

            self.cursor = Some(end + Duration::minutes(window.buffer_minutes));

            let taken = self
                .booked
                .iter()
                .any(|&(booked_start, booked_end)| start < booked_end && end > booked_start);

            return Some(Slot {
                doctor_id: self.doctor_id,
                start_time: start,
                end_time: end,
                status: if taken {
                    SlotStatus::Taken
                } else {
                    SlotStatus::Available
                },
            });
        }
    }
}

impl Slots {
    /// Convenience view keeping only slots that are actually bookable.
    pub fn available(self) -> impl Iterator<Item = Slot> {
        self.filter(|slot| slot.status == SlotStatus::Available)
    }
}
