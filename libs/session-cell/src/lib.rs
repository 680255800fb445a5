//! # Session Cell
//!
//! Runtime coordination for live consultations. A session exists only while
//! an appointment is being conducted: participants join against the committed
//! appointment record, exchange ordered signaling events over bounded
//! per-participant queues, and receive short-lived media tokens scoped to the
//! appointment. The coordinator drives the Confirmed to InProgress transition
//! when both parties are present, and the completion when the consultation
//! ends.
//!
//! Session state is ephemeral; nothing here survives a restart, and the
//! appointment record in the store remains the durable source of truth.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

use std::sync::Arc;

use services::coordinator::SessionCoordinator;

/// Shared state for the session routes.
pub struct SessionState {
    pub coordinator: Arc<SessionCoordinator>,
}
