// libs/session-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::SessionState;

pub fn session_routes(state: Arc<SessionState>) -> Router {
    Router::new()
        .route("/{appointment_id}/join", post(handlers::join_session))
        .route("/{appointment_id}/events", get(handlers::poll_events))
        .route("/{appointment_id}/publish", post(handlers::publish))
        .route("/{appointment_id}/leave", post(handlers::leave_session))
        .route("/{appointment_id}/end", post(handlers::end_session))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(state)
}
