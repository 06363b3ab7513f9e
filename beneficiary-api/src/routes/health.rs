//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    providers: Vec<String>,
    direct_reasoning: bool,
    runs: u64,
    cache_hits: u64,
    errors: u64,
}

/// Degraded when no research provider is configured
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let providers = state.pipeline.provider_names();
    let healthy = !providers.is_empty();

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        providers,
        direct_reasoning: state.pipeline.has_direct_reasoner(),
        runs: state.metrics.runs(),
        cache_hits: state.metrics.cache_hits(),
        errors: state.metrics.errors(),
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
