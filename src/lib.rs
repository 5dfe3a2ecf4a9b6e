//! chatbridge - streaming bridge to stateful chat backends
//!
//! This library provides the generation-session bridge: one uniform,
//! cancellable streaming contract in front of several chat backends, with
//! per-provider conversation continuity kept in a caller-owned session.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod provider;
pub mod routes;
pub mod session;
pub mod streaming;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

pub use crate::bridge::{Bridge, Channel, GenerationOutcome, GenerationSession, ServerFrame};
pub use crate::config::{Config, StaticUserConfig, UserConfig, UserConfigProvider};
pub use crate::dispatch::{DispatchRouter, RouteTarget};
pub use crate::provider::{ProviderAdapter, StreamEvent};
pub use crate::session::Session;

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub bridge: Arc<Bridge>,
    pub http_client: reqwest::Client,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state with the built-in providers
    pub fn new(config: Config) -> Result<Self> {
        // Initialize HTTP client with connection pooling
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .build()?;

        let router = Arc::new(DispatchRouter::with_builtin(
            http_client.clone(),
            &config.bing_api_url,
        ));
        let user_config = Arc::new(StaticUserConfig::new(config.user.clone()));
        let bridge = Arc::new(Bridge::new(router, user_config));

        Ok(Self::with_bridge(config, bridge, http_client))
    }

    /// Create a state around an existing bridge (custom providers, tests)
    pub fn with_bridge(config: Config, bridge: Arc<Bridge>, http_client: reqwest::Client) -> Self {
        Self {
            config,
            bridge,
            http_client,
            start_time: Instant::now(),
        }
    }
}
