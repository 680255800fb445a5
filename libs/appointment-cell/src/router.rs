// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::AppointmentState;

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route(
            "/{appointment_id}/transition",
            post(handlers::transition_appointment),
        )
        .route("/tick", post(handlers::tick))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(state)
}
