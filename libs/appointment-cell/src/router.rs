// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(config: Arc<AppConfig>) -> Router {
    let state = AppointmentState::new(config.clone());

    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/search", get(handlers::search_appointments))
        .route("/availability", get(handlers::get_availability))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_status))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/check-in", post(handlers::check_in))

        // Administrative holds
        .route("/blocks", post(handlers::block_time))
        .route("/blocks/{block_id}", delete(handlers::delete_block))

        // Provider dashboards
        .route("/providers/{provider_id}/day", get(handlers::get_provider_day))
        .route("/providers/{provider_id}/summary", get(handlers::get_daily_summary))

        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
