//! Operator recovery endpoints.

use axum::{Json, extract::State};
use warden_common::{CacheStats, CircuitSnapshot};

use crate::state::Services;

/// Force the breaker closed
pub async fn reset_circuit(State(services): State<Services>) -> Json<CircuitSnapshot> {
    services.circuit.reset();
    Json(services.circuit.snapshot())
}

/// Drop every cached verdict and recent failure
pub async fn clear_cache(State(services): State<Services>) -> Json<CacheStats> {
    services.cache.clear();
    tracing::info!("Result cache cleared by operator");
    Json(services.cache.stats())
}
