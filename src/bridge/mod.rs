//! Generation-session bridge
//!
//! [`Bridge`] ties the pieces together: the dispatch router picks an adapter,
//! the in-flight registry keeps one generation per session and provider, and
//! every [`GenerationSession`] gets a cancellation trigger that is a child of
//! the bridge's shutdown token.

pub mod cancel;
pub mod channel;
pub mod generation;

pub use cancel::{CancelReason, CancelTrigger};
pub use channel::{
    CallerEnd, Channel, ChannelSessionManager, ChannelWriter, ClientMessage, ServerFrame,
};
pub use generation::{GenerationOutcome, GenerationSession};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    config::{ModelMode, UserConfigProvider},
    dispatch::{DispatchRouter, RouteTarget},
    error::AppResult,
    provider::BoxedAdapter,
    session::{InFlightRegistry, Session},
};

/// A routed adapter, ready to generate
#[derive(Clone)]
pub struct PreparedGeneration {
    adapter: BoxedAdapter,
    mode: ModelMode,
}

impl PreparedGeneration {
    pub fn new(adapter: BoxedAdapter, mode: ModelMode) -> Self {
        Self { adapter, mode }
    }

    pub fn provider(&self) -> &str {
        self.adapter.name()
    }

    pub fn model(&self) -> &str {
        self.adapter.model()
    }
}

/// Entry point for generations
pub struct Bridge {
    router: Arc<DispatchRouter>,
    user_config: Arc<dyn UserConfigProvider>,
    inflight: InFlightRegistry,
    shutdown: CancellationToken,
}

impl Bridge {
    pub fn new(router: Arc<DispatchRouter>, user_config: Arc<dyn UserConfigProvider>) -> Self {
        Self {
            router,
            user_config,
            inflight: InFlightRegistry::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn router(&self) -> &DispatchRouter {
        &self.router
    }

    pub fn inflight(&self) -> &InFlightRegistry {
        &self.inflight
    }

    /// Cancel every in-flight generation
    pub fn shutdown(&self) {
        info!(active = self.inflight.len(), "Cancelling in-flight generations");
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolve the adapter for a selection.
    ///
    /// Runs before anything is written to the caller, so configuration errors
    /// never produce a channel frame.
    pub async fn prepare(
        &self,
        target: &RouteTarget,
        access_token: Option<String>,
    ) -> AppResult<PreparedGeneration> {
        let user = self.user_config.user_config().await?;
        let adapter = self.router.route(target, access_token, &user)?;
        Ok(PreparedGeneration::new(adapter, user.model_mode))
    }

    /// Run one generation over `channel`.
    ///
    /// A second generation for the same session and provider is rejected with
    /// an error frame while the first is still running.
    #[instrument(
        skip_all,
        fields(provider = %prepared.provider(), session_id = %session.session_id)
    )]
    pub async fn generate(
        &self,
        prepared: PreparedGeneration,
        question: &str,
        session: &mut Session,
        channel: Channel,
    ) -> AppResult<GenerationOutcome> {
        let _guard = match self.inflight.acquire(&session.session_id, prepared.provider()) {
            Ok(guard) => guard,
            Err(err) => {
                channel.reject(&err).await;
                return Err(err);
            }
        };

        let trigger = CancelTrigger::child_of(&self.shutdown);
        GenerationSession::new(prepared.adapter, trigger, prepared.mode)
            .run(question, session, channel)
            .await
    }
}
