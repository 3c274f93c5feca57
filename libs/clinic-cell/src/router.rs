// libs/clinic-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn clinic_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/{clinic_id}/operating-window", get(handlers::get_operating_window))
        .route("/{clinic_id}/operating-hours", put(handlers::upsert_operating_hours))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
