//! HTTP routes for the bridge
//!
//! This module defines all HTTP endpoints exposed by the server.

pub mod channel;
pub mod health;
pub mod metrics;
pub mod models;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Callers are browser extensions on arbitrary origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let bridge_routes = Router::new()
        .route("/v1/channel", get(channel::open_channel))
        .route("/v1/models", get(models::list_models));

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    Router::new()
        .merge(public_routes)
        .merge(bridge_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
