//! HTTP route handlers for Warden.

use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::Services;

mod admin;
mod health;
mod validate;

/// Create the main application router
#[allow(deprecated)]
pub fn create_router(services: Services) -> Router {
    let timeout = Duration::from_secs(services.config.http_timeout_secs);

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // Password validation
        .route("/validate-password", post(validate::validate_password))

        // Operator endpoints
        .nest("/admin", admin_routes())

        // Add shared state
        .with_state(services)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

/// Admin routes (circuit and cache management)
fn admin_routes() -> Router<Services> {
    Router::new()
        .route("/circuit/reset", post(admin::reset_circuit))
        .route("/cache/clear", post(admin::clear_cache))
}
