//! In-process appointment store.
//!
//! This crate is the persistence seam for the scheduling core. It provides the
//! two atomic conditional-write primitives the rest of the system is built on:
//!
//! - [`AppointmentStore::reserve`]: overlap-guarded conditional insert,
//!   serialized per doctor, with idempotency-key replay.
//! - [`AppointmentStore::apply`]: versioned update of a single appointment,
//!   rejected when the caller's expected version is stale.
//!
//! Critical sections are plain `std::sync` locks with no await points inside,
//! so a cancelled caller can never observe a partial mutation. Appointments
//! are never deleted; terminal records remain as an audit trail.

pub mod appointment;
pub mod store;

pub use appointment::{Appointment, AppointmentPatch, AppointmentStatus, ReserveRequest};
pub use store::{AppointmentStore, StoreError};
