//! HTTP endpoint tests
//!
//! Tests for the routes served next to the channel:
//! - GET /health, /health/ready, /health/live
//! - GET /v1/models
//! - GET /v1/channel routing failures (answered before any upgrade)

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;

use chatbridge::{config::UserConfig, routes};

use crate::common::{builtin_bridge, scripted_bridge, test_state, ScriptedAdapter};

fn builtin_server() -> (TestServer, std::sync::Arc<chatbridge::AppState>) {
    let state = test_state(builtin_bridge(UserConfig::default(), "http://127.0.0.1:9"));
    let server = TestServer::new(routes::create_router(state.clone()))
        .expect("Failed to create test server");
    (server, state)
}

#[tokio::test]
async fn test_health_reports_providers() {
    let (server, _) = builtin_server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["providers"].as_array().unwrap().len(), 4);
    assert_eq!(json["stats"]["active_generations"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_health_degraded_without_builtin_providers() {
    let state = test_state(scripted_bridge(ScriptedAdapter::new(vec![])));
    let server =
        TestServer::new(routes::create_router(state)).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_readiness_fails_after_shutdown() {
    let (server, state) = builtin_server();

    server.get("/health/ready").await.assert_status_ok();
    server.get("/health/live").await.assert_status_ok();

    state.bridge.shutdown();

    let response = server.get("/health/ready").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert_eq!(json["status"], "unhealthy");
}

#[tokio::test]
async fn test_models_lists_catalog() {
    let (server, _) = builtin_server();

    let response = server.get("/v1/models").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["object"], "list");
    let bing = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["id"] == "bingFree4")
        .expect("bingFree4 should be listed");
    assert_eq!(bing["provider"], "bingWeb");
}

#[tokio::test]
async fn test_channel_unknown_provider_is_configuration_error() {
    let (server, _) = builtin_server();

    let response = server
        .get("/v1/channel")
        .add_query_param("provider", "unknown-model")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_channel_mismatched_pair_is_configuration_error() {
    let (server, _) = builtin_server();

    let response = server
        .get("/v1/channel")
        .add_query_param("provider", "bingWeb")
        .add_query_param("model", "chatgptApi35")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_channel_requires_websocket_upgrade() {
    let (server, _) = builtin_server();

    let response = server
        .get("/v1/channel")
        .add_query_param("model", "bingFree4")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    routes::metrics::init_metrics();
    routes::metrics::record_generation("bingWeb", "completed", 0.25);
    let (server, _) = builtin_server();

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    assert!(response.text().contains("chatbridge_generations_total"));
}
