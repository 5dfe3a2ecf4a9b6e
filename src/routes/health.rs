//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with bridge status
//! - `/health/ready` - Readiness probe
//! - `/health/live` - Liveness probe

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{provider::names, AppState};

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Bridge statistics
#[derive(Debug, Serialize)]
pub struct HealthStats {
    pub uptime_seconds: u64,
    pub active_generations: usize,
    pub models: usize,
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub providers: Vec<&'static str>,
    pub stats: HealthStats,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

const BUILTIN_PROVIDERS: [&str; 4] = [
    names::BING_WEB,
    names::CHATGPT_API,
    names::CUSTOM_API,
    names::CHATGPT_WEB,
];

fn bridge_status(state: &AppState) -> HealthStatus {
    if state.bridge.is_shutting_down() {
        HealthStatus::Unhealthy
    } else if BUILTIN_PROVIDERS
        .iter()
        .any(|p| !state.bridge.router().has_provider(p))
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn status_code(status: &HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Full health check endpoint
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let status = bridge_status(&state);
    let uptime = state.start_time.elapsed().as_secs();

    let providers = BUILTIN_PROVIDERS
        .into_iter()
        .filter(|p| state.bridge.router().has_provider(p))
        .collect();

    let response = HealthResponse {
        status: status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        timestamp: chrono::Utc::now().to_rfc3339(),
        providers,
        stats: HealthStats {
            uptime_seconds: uptime,
            active_generations: state.bridge.inflight().len(),
            models: state.bridge.router().catalog().all().len(),
        },
    };

    (status_code(&status), Json(response))
}

/// Readiness probe endpoint
///
/// Not ready once shutdown has begun.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    let status = match bridge_status(&state) {
        HealthStatus::Unhealthy => HealthStatus::Unhealthy,
        _ => HealthStatus::Healthy,
    };
    (status_code(&status), Json(SimpleHealthResponse { status }))
}

/// Liveness probe endpoint
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
