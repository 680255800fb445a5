//! # Appointment Cell
//!
//! Owns the two mutating halves of the scheduling core:
//!
//! - the booking transaction manager, which commits a slot reservation
//!   exactly once per idempotency key and re-validates availability at
//!   commit time, and
//! - the appointment state machine, a pure transition table applied through
//!   the store's versioned update so concurrent status changes surface as
//!   `StaleVersion` rather than lost updates.
//!
//! Appointments are never deleted; cancellations and no-shows terminate the
//! record in place, preserving the audit trail.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

use services::booking::BookingService;
use services::lifecycle::LifecycleService;

/// Shared state for the appointment routes.
pub struct AppointmentState {
    pub booking: BookingService,
    pub lifecycle: LifecycleService,
}
