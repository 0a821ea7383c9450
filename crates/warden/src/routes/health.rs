//! Health check endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use warden_common::{
    CacheStats, CategoryStats, CircuitSnapshot, CircuitState, ClientMetricsSnapshot, ErrorCategory,
};

use crate::state::Services;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    online: bool,
    circuit: CircuitState,
}

/// Readiness check: online, and the breach provider not shed
pub async fn ready_check(
    State(services): State<Services>,
) -> (StatusCode, Json<ReadyResponse>) {
    let online = services.connectivity.is_online();
    let circuit = services.circuit.state();

    if online && circuit != CircuitState::Open {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                online,
                circuit,
            }),
        )
    } else {
        // Return 503 if not ready
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "degraded",
                online,
                circuit,
            }),
        )
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    uptime_secs: u64,
    online: bool,
    connectivity_transitions: u64,
    offline_queue: usize,
    client: ClientMetricsSnapshot,
    cache: CacheStats,
    circuit: CircuitSnapshot,
    errors: BTreeMap<ErrorCategory, CategoryStats>,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics(
    State(services): State<Services>,
) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_secs: services.uptime().as_secs(),
        online: services.connectivity.is_online(),
        connectivity_transitions: services.connectivity.transitions(),
        offline_queue: services.offline.len(),
        client: services.client.metrics(),
        cache: services.cache.stats(),
        circuit: services.circuit.snapshot(),
        errors: services.errors.stats(),
    })
}
