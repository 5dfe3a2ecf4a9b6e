//! Common test utilities for the bridge
//!
//! Provides a scripted adapter, bridge and state builders, and helpers for
//! reading frames off a caller channel.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use chatbridge::{
    bridge::{Bridge, ServerFrame},
    config::{Config, StaticUserConfig, UserConfig},
    dispatch::{AdapterContext, DispatchRouter, ModelSpec},
    error::{AppError, AppResult},
    provider::{AdapterStream, BoxedAdapter, GenerateRequest, ProviderAdapter, StreamEvent},
    session::ContinuityBundle,
    streaming::Sanitizer,
    AppState,
};

/// Test configuration constants
pub mod constants {
    /// Provider name of the scripted adapter
    pub const SCRIPTED: &str = "scripted";
    /// Catalog key of the scripted adapter's model
    pub const SCRIPTED_MODEL: &str = "scriptedModel";
    /// Test access token
    pub const TEST_TOKEN: &str = "test-access-token";
}

/// One step of a scripted exchange
#[derive(Debug, Clone)]
pub enum Step {
    /// Emit cumulative text
    Progress(String),
    /// Finish with this bundle
    Complete(Value),
    /// Fail with a transport error
    Fail(String),
    /// Wait, unless cancelled first
    Pause(Duration),
    /// Wait until cancelled
    Hang,
}

pub fn progress(text: &str) -> Step {
    Step::Progress(text.to_string())
}

/// Adapter that plays back a fixed script and records its requests
pub struct ScriptedAdapter {
    steps: Vec<Step>,
    sanitizer: Sanitizer,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedAdapter {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            sanitizer: Sanitizer::none(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_citations(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            sanitizer: Sanitizer::citation_markers(),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        constants::SCRIPTED
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn sanitizer(&self) -> Sanitizer {
        self.sanitizer.clone()
    }

    async fn generate(&self, request: GenerateRequest) -> AppResult<AdapterStream> {
        self.requests.lock().unwrap().push(request.clone());

        let steps = self.steps.clone();
        let cancel = request.cancel;

        Ok(Box::pin(try_stream! {
            for step in steps {
                match step {
                    Step::Progress(text) => yield StreamEvent::Progress(text),
                    Step::Complete(bundle) => {
                        yield StreamEvent::Completed(ContinuityBundle::new(bundle));
                        break;
                    }
                    Step::Fail(message) => Err::<(), _>(AppError::Transport(message))?,
                    Step::Pause(duration) => {
                        let cancelled = tokio::select! {
                            _ = cancel.cancelled() => true,
                            _ = tokio::time::sleep(duration) => false,
                        };
                        if cancelled {
                            Err::<(), _>(AppError::Cancelled)?;
                        }
                    }
                    Step::Hang => {
                        cancel.cancelled().await;
                        Err::<(), _>(AppError::Cancelled)?;
                    }
                }
            }
        }))
    }
}

/// Router serving only the scripted adapter
pub fn scripted_router(adapter: Arc<ScriptedAdapter>) -> DispatchRouter {
    let router = DispatchRouter::empty(reqwest::Client::new(), "http://127.0.0.1:9");
    router.register(
        constants::SCRIPTED,
        Arc::new(move |_ctx: AdapterContext<'_>| -> AppResult<BoxedAdapter> {
            Ok(adapter.clone() as BoxedAdapter)
        }),
    );
    router.register_model(ModelSpec::new(
        constants::SCRIPTED_MODEL,
        constants::SCRIPTED,
        Some("scripted-1"),
        "Scripted",
    ));
    router
}

pub fn scripted_bridge(adapter: Arc<ScriptedAdapter>) -> Bridge {
    Bridge::new(
        Arc::new(scripted_router(adapter)),
        Arc::new(StaticUserConfig::new(UserConfig::default())),
    )
}

/// Bridge with the built-in providers, pointed at mock backends through `user` and `bing_url`
pub fn builtin_bridge(user: UserConfig, bing_url: &str) -> Bridge {
    Bridge::new(
        Arc::new(DispatchRouter::with_builtin(reqwest::Client::new(), bing_url)),
        Arc::new(StaticUserConfig::new(user)),
    )
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        upstream_timeout_seconds: 5,
        bing_api_url: "http://127.0.0.1:9".to_string(),
        user: UserConfig::default(),
    }
}

pub fn test_state(bridge: Bridge) -> Arc<AppState> {
    Arc::new(AppState::with_bridge(
        test_config(),
        Arc::new(bridge),
        reqwest::Client::new(),
    ))
}

/// Next frame, failing the test if none arrives in time
pub async fn next_frame(rx: &mut mpsc::Receiver<ServerFrame>) -> Option<ServerFrame> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a frame")
}

/// Every frame until the bridge closes the channel
pub async fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = next_frame(rx).await {
        frames.push(frame);
    }
    frames
}

/// Answer text of every partial frame
pub fn partial_answers(frames: &[ServerFrame]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| match f {
            ServerFrame::Answer {
                answer,
                done: false,
                ..
            } => Some(answer.clone()),
            _ => None,
        })
        .collect()
}
