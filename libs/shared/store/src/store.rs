use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::appointment::{Appointment, AppointmentPatch, AppointmentStatus, ReserveRequest};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot overlaps an existing appointment")]
    SlotTaken,

    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Idempotency key replayed with different arguments")]
    IdempotencyMismatch,
}

/// Per-doctor ledger: the only state requiring mutual exclusion.
///
/// Everything inside is guarded by one mutex, so the overlap check and the
/// insert in [`AppointmentStore::reserve`] are indivisible with respect to
/// other bookings for the same doctor.
#[derive(Default)]
struct DoctorLedger {
    appointments: HashMap<Uuid, Arc<Mutex<Appointment>>>,
    idempotency: HashMap<String, Uuid>,
}

/// In-process appointment store, sharded by doctor.
///
/// Bookings serialize on the owning doctor's ledger; transitions serialize on
/// the individual appointment record. Unrelated doctors and unrelated
/// appointments never contend.
#[derive(Default)]
pub struct AppointmentStore {
    ledgers: RwLock<HashMap<Uuid, Arc<Mutex<DoctorLedger>>>>,
    /// appointment id -> owning doctor, for O(1) record lookup.
    directory: RwLock<HashMap<Uuid, Uuid>>,
    /// idempotency key -> owning doctor, so a key replayed against a
    /// different doctor is caught before entering that doctor's gate.
    keys: Mutex<HashMap<String, Uuid>>,
}

impl AppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically commit a slot reservation.
    ///
    /// Inside the doctor's critical section this checks the idempotency
    /// registry, verifies no non-terminal appointment overlaps the requested
    /// slot, and inserts the new record. Exactly one of N racing calls for
    /// the same slot succeeds; the rest get [`StoreError::SlotTaken`].
    pub fn reserve(&self, request: ReserveRequest) -> Result<Appointment, StoreError> {
        // Claim the key globally first. Keys are registered per doctor inside
        // the ledger, so without this a replay naming a different doctor
        // would never find the original entry.
        let claimed = {
            let mut keys = self.keys.lock().expect("key index poisoned");
            match keys.get(&request.idempotency_key) {
                Some(owner) if *owner != request.doctor_id => {
                    warn!(
                        "Idempotency key {} replayed against a different doctor",
                        request.idempotency_key
                    );
                    return Err(StoreError::IdempotencyMismatch);
                }
                Some(_) => false,
                None => {
                    keys.insert(request.idempotency_key.clone(), request.doctor_id);
                    true
                }
            }
        };

        let ledger = self.ledger_for(request.doctor_id);
        let appointment = {
            let mut ledger = ledger.lock().expect("doctor ledger poisoned");

            if let Some(existing_id) = ledger.idempotency.get(&request.idempotency_key) {
                let existing = ledger
                    .appointments
                    .get(existing_id)
                    .expect("idempotency entry without record")
                    .lock()
                    .expect("appointment record poisoned")
                    .clone();
                return if request.matches(&existing) {
                    debug!(
                        "Idempotent replay of booking {} for doctor {}",
                        existing.id, request.doctor_id
                    );
                    Ok(existing)
                } else {
                    warn!(
                        "Idempotency key {} replayed with different arguments",
                        request.idempotency_key
                    );
                    Err(StoreError::IdempotencyMismatch)
                };
            }

            let taken = ledger.appointments.values().any(|record| {
                let record = record.lock().expect("appointment record poisoned");
                !record.status.is_terminal()
                    && record.overlaps(request.start_time, request.end_time)
            });
            if taken {
                // A failed reservation never committed anything, so the key
                // must stay usable.
                if claimed {
                    self.keys
                        .lock()
                        .expect("key index poisoned")
                        .remove(&request.idempotency_key);
                }
                return Err(StoreError::SlotTaken);
            }

            let now = Utc::now();
            let appointment = Appointment {
                id: Uuid::new_v4(),
                doctor_id: request.doctor_id,
                patient_id: request.patient_id,
                start_time: request.start_time,
                end_time: request.end_time,
                status: AppointmentStatus::Scheduled,
                version: 1,
                created_at: now,
                updated_at: now,
                cancellation_reason: None,
                abnormal_termination: false,
            };
            ledger
                .idempotency
                .insert(request.idempotency_key.clone(), appointment.id);
            ledger
                .appointments
                .insert(appointment.id, Arc::new(Mutex::new(appointment.clone())));
            appointment
        };

        // The caller learns the id only after this insert completes, so the
        // record is always reachable by the time anyone can look it up.
        self.directory
            .write()
            .expect("directory poisoned")
            .insert(appointment.id, appointment.doctor_id);

        debug!(
            "Reserved appointment {} for doctor {} at {}",
            appointment.id, appointment.doctor_id, appointment.start_time
        );
        Ok(appointment)
    }

    /// Fetch a snapshot of one appointment.
    pub fn get(&self, appointment_id: Uuid) -> Result<Appointment, StoreError> {
        let record = self.record(appointment_id)?;
        let record = record.lock().expect("appointment record poisoned");
        Ok(record.clone())
    }

    /// Versioned update of a single appointment.
    ///
    /// Fails with [`StoreError::VersionConflict`] when the record has moved on
    /// since the caller read it; the caller is expected to re-read and retry
    /// with fresh data, never blindly.
    pub fn apply(
        &self,
        appointment_id: Uuid,
        expected_version: u64,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        let record = self.record(appointment_id)?;
        let mut record = record.lock().expect("appointment record poisoned");

        if record.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: record.version,
            });
        }

        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(reason) = patch.cancellation_reason {
            record.cancellation_reason = Some(reason);
        }
        if let Some(abnormal) = patch.abnormal_termination {
            record.abnormal_termination = abnormal;
        }
        record.version += 1;
        record.updated_at = Utc::now();

        debug!(
            "Appointment {} moved to {} (version {})",
            record.id, record.status, record.version
        );
        Ok(record.clone())
    }

    /// Snapshot of a doctor's appointments intersecting the given range.
    ///
    /// Offers no reservation: callers must re-validate at booking time.
    pub fn booked_ranges(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Appointment> {
        let ledger = self.ledger_for(doctor_id);
        let ledger = ledger.lock().expect("doctor ledger poisoned");
        let mut booked: Vec<Appointment> = ledger
            .appointments
            .values()
            .map(|record| record.lock().expect("appointment record poisoned").clone())
            .filter(|record| !record.status.is_terminal() && record.overlaps(from, to))
            .collect();
        booked.sort_by_key(|record| record.start_time);
        booked
    }

    /// Snapshot of every non-terminal appointment, for the external scheduler's tick.
    pub fn active_appointments(&self) -> Vec<Appointment> {
        let ledgers: Vec<Arc<Mutex<DoctorLedger>>> = {
            let ledgers = self.ledgers.read().expect("ledger map poisoned");
            ledgers.values().cloned().collect()
        };
        let mut active = Vec::new();
        for ledger in ledgers {
            let ledger = ledger.lock().expect("doctor ledger poisoned");
            active.extend(
                ledger
                    .appointments
                    .values()
                    .map(|record| record.lock().expect("appointment record poisoned").clone())
                    .filter(|record| !record.status.is_terminal()),
            );
        }
        active
    }

    fn ledger_for(&self, doctor_id: Uuid) -> Arc<Mutex<DoctorLedger>> {
        if let Some(ledger) = self
            .ledgers
            .read()
            .expect("ledger map poisoned")
            .get(&doctor_id)
        {
            return Arc::clone(ledger);
        }
        let mut ledgers = self.ledgers.write().expect("ledger map poisoned");
        Arc::clone(ledgers.entry(doctor_id).or_default())
    }

    fn record(&self, appointment_id: Uuid) -> Result<Arc<Mutex<Appointment>>, StoreError> {
        let doctor_id = *self
            .directory
            .read()
            .expect("directory poisoned")
            .get(&appointment_id)
            .ok_or(StoreError::NotFound)?;
        let ledger = self.ledger_for(doctor_id);
        let ledger = ledger.lock().expect("doctor ledger poisoned");
        ledger
            .appointments
            .get(&appointment_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}
