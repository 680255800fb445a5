//! # Scheduling Cell
//!
//! Owns the availability model (a doctor's recurring weekly windows plus
//! date-specific exceptions) and the slot generator that projects bookable
//! slots from availability and existing appointments.
//!
//! Slots are derived, never persisted: every query recomputes them against a
//! fresh snapshot of the doctor's non-terminal appointments, so a generated
//! slot is a suggestion, not a reservation. The booking path re-validates at
//! commit time.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

use std::sync::Arc;

use services::availability::AvailabilityDirectory;
use services::slots::SlotGenerator;

/// Shared state for the scheduling routes.
pub struct SchedulingState {
    pub directory: Arc<AvailabilityDirectory>,
    pub generator: SlotGenerator,
}
