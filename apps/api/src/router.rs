use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use appointment_cell::services::booking::BookingService;
use appointment_cell::services::lifecycle::{LifecycleRules, LifecycleService};
use appointment_cell::services::notify::TracingDispatcher;
use appointment_cell::AppointmentState;
use scheduling_cell::router::scheduling_routes;
use scheduling_cell::services::availability::AvailabilityDirectory;
use scheduling_cell::services::slots::SlotGenerator;
use scheduling_cell::SchedulingState;
use session_cell::router::session_routes;
use session_cell::services::coordinator::SessionCoordinator;
use session_cell::SessionState;
use shared_config::CoreConfig;
use shared_store::AppointmentStore;

pub fn create_router(config: CoreConfig) -> Router {
    let store = Arc::new(AppointmentStore::new());
    let directory = Arc::new(AvailabilityDirectory::new());
    let dispatcher = Arc::new(TracingDispatcher);

    let lifecycle = LifecycleService::new(
        Arc::clone(&store),
        dispatcher.clone(),
        LifecycleRules::from_config(&config),
    );
    let booking = BookingService::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        dispatcher,
        &config,
    );
    let coordinator = Arc::new(SessionCoordinator::new(
        Arc::clone(&store),
        lifecycle.clone(),
        &config,
    ));

    let scheduling_state = Arc::new(SchedulingState {
        directory: Arc::clone(&directory),
        generator: SlotGenerator::new(directory, store, config.slot_horizon_days),
    });
    let appointment_state = Arc::new(AppointmentState { booking, lifecycle });
    let session_state = Arc::new(SessionState { coordinator });

    Router::new()
        .route("/", get(|| async { "Telehealth Scheduling API is running!" }))
        .nest("/availability", scheduling_routes(scheduling_state))
        .nest("/appointments", appointment_routes(appointment_state))
        .nest("/sessions", session_routes(session_state))
}
