//! Mock infrastructure for the chat backends
//!
//! This module provides wiremock servers for the built-in providers:
//! - Bing chat (hosted conversations)
//! - OpenAI-compatible chat completions
//! - ChatGPT web backend
//!
//! Each mock streams its backend's wire format so adapters can be exercised
//! end to end through the bridge.

pub mod bing;
pub mod chatgpt_web;

pub use bing::*;
pub use chatgpt_web::*;
pub use openai::*;

/// Join SSE payloads into a `data:` event stream body
pub fn sse_body<I, S>(payloads: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    payloads
        .into_iter()
        .map(|p| format!("data: {}\n\n", p.as_ref()))
        .collect()
}
