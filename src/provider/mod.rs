//! Provider client adapters
//!
//! Every chat backend is wrapped in a [`ProviderAdapter`]. Adapters hide the
//! backend's authentication, session-continuity and streaming quirks behind one
//! contract: given a question, stream the cumulative answer and finish with the
//! continuity bundle that resumes the conversation next time.
//!
//! Variants:
//! - [`bing::BingWebClient`] - hosted-session client
//! - [`openai::OpenAiClient`] - key-authenticated API client and custom endpoints
//! - [`chatgpt_web::ChatGptWebClient`] - browser-session client

pub mod bing;
pub mod chatgpt_web;
pub mod http;
pub mod openai;

pub use bing::BingWebClient;
pub use chatgpt_web::ChatGptWebClient;
pub use openai::OpenAiClient;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ModelMode,
    error::AppResult,
    session::{ContinuityBundle, ConversationRecord},
    streaming::Sanitizer,
};

/// Provider names used by the dispatch registry and as `providerState` keys
pub mod names {
    pub const BING_WEB: &str = "bingWeb";
    pub const CHATGPT_API: &str = "chatgptApi";
    pub const CUSTOM_API: &str = "customApi";
    pub const CHATGPT_WEB: &str = "chatgptWeb";
}

/// Everything an adapter needs for one exchange
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub question: String,
    /// Cancelled when the caller stops or disconnects; checked at every I/O boundary
    pub cancel: CancellationToken,
    pub mode: ModelMode,
    /// Bundle from the last successful exchange with this provider, if any
    pub resume: Option<ContinuityBundle>,
    /// Local transcript, for backends that rebuild context client-side
    pub history: Vec<ConversationRecord>,
}

/// An item of an adapter's output stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The full answer so far (not a delta)
    Progress(String),
    /// The exchange finished; carries the bundle to resume from next time
    Completed(ContinuityBundle),
}

/// Stream returned by [`ProviderAdapter::generate`]
pub type AdapterStream = BoxStream<'static, AppResult<StreamEvent>>;

/// A chat backend
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, also the key of this provider's continuity bundle
    fn name(&self) -> &str;

    /// Model identifier sent upstream
    fn model(&self) -> &str;

    /// Rules applied to the cumulative answer before it reaches the caller
    fn sanitizer(&self) -> Sanitizer {
        Sanitizer::none()
    }

    /// Start an exchange.
    ///
    /// Errors before the first byte (bad credentials, refused connection) are
    /// returned directly; errors after that arrive as stream items. A stream
    /// that ends without [`StreamEvent::Completed`] is treated as a transport
    /// failure by the caller.
    async fn generate(&self, request: GenerateRequest) -> AppResult<AdapterStream>;
}

/// A shared adapter for dynamic dispatch
pub type BoxedAdapter = Arc<dyn ProviderAdapter>;
