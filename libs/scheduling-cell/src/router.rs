// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::SchedulingState;

pub fn scheduling_routes(state: Arc<SchedulingState>) -> Router {
    Router::new()
        .route("/{doctor_id}", put(handlers::upsert_schedule))
        .route("/{doctor_id}", get(handlers::get_schedule))
        .route("/{doctor_id}/exceptions", post(handlers::add_exception))
        .route("/{doctor_id}/slots", get(handlers::get_slots))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(state)
}
