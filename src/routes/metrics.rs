//! Prometheus metrics endpoint
//!
//! Exposes generation metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "chatbridge_generations_total",
        "Generations by provider and outcome"
    );
    metrics::describe_counter!(
        "chatbridge_cancellations_total",
        "Cancelled generations by reason"
    );
    metrics::describe_histogram!(
        "chatbridge_generation_duration_seconds",
        "Generation duration in seconds"
    );
    metrics::describe_gauge!(
        "chatbridge_active_channels",
        "Number of open caller channels"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record a finished generation; `outcome` is `completed`, `cancelled` or an error code
pub fn record_generation(provider: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "chatbridge_generations_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "chatbridge_generation_duration_seconds",
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

pub fn record_cancellation(reason: &str) {
    metrics::counter!("chatbridge_cancellations_total", "reason" => reason.to_string())
        .increment(1);
}

pub fn channel_opened() {
    metrics::gauge!("chatbridge_active_channels").increment(1.0);
}

pub fn channel_closed() {
    metrics::gauge!("chatbridge_active_channels").decrement(1.0);
}
