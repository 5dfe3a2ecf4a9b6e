//! OpenAI chat-completions client
//!
//! Serves two providers with the same wire format:
//! - `chatgptApi`: api.openai.com (or a configured mirror) with a required API key
//! - `customApi`: any OpenAI-compatible endpoint at a caller-configured URL,
//!   where the key is optional
//!
//! The backend is stateless, so context is rebuilt from the local transcript
//! on every request and the continuity bundle only records what was used.

use async_stream::try_stream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    config::UserConfig,
    error::{AppError, AppResult},
    session::{ContinuityBundle, ConversationRecord},
    streaming::{next_chunk, sse_data, SseLineBuffer},
};

use super::{http, names, AdapterStream, GenerateRequest, ProviderAdapter, StreamEvent};

const SYSTEM_PROMPT: &str = "You are a helpful, creative, clever, and very friendly assistant. \
You are familiar with various languages in the world.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
}

/// Continuity bundle for chat-completions backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiContinuity {
    pub model: String,
    pub last_completion_id: Option<String>,
}

/// Streaming chat-completions client
pub struct OpenAiClient {
    client: reqwest::Client,
    provider: &'static str,
    endpoint: String,
    api_key: Option<String>,
    key_required: bool,
    model: String,
}

impl OpenAiClient {
    /// Key-authenticated client for the official API.
    ///
    /// A caller-supplied token takes precedence over the configured key.
    pub fn api(
        client: reqwest::Client,
        user: &UserConfig,
        access_token: Option<String>,
        model: &str,
    ) -> Self {
        Self {
            client,
            provider: names::CHATGPT_API,
            endpoint: format!(
                "{}/v1/chat/completions",
                user.custom_openai_api_url.trim_end_matches('/')
            ),
            api_key: access_token.or_else(|| user.api_key.clone()),
            key_required: true,
            model: model.to_string(),
        }
    }

    /// Client for a custom OpenAI-compatible endpoint
    pub fn custom(
        client: reqwest::Client,
        user: &UserConfig,
        access_token: Option<String>,
        model: &str,
    ) -> Self {
        Self {
            client,
            provider: names::CUSTOM_API,
            endpoint: user.custom_model_api_url.clone(),
            api_key: access_token.or_else(|| user.api_key.clone()),
            key_required: false,
            model: model.to_string(),
        }
    }

    fn build_messages<'a>(
        history: &'a [ConversationRecord],
        question: &'a str,
    ) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        });
        for record in history {
            messages.push(ChatMessage {
                role: "user",
                content: &record.question,
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: &record.answer,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: question,
        });
        messages
    }
}

/// Outcome of one SSE line
enum LineOutcome {
    Delta(String),
    Done,
    Skip,
}

fn parse_line(line: &str, completion_id: &mut Option<String>) -> AppResult<LineOutcome> {
    let Some(data) = sse_data(line) else {
        return Ok(LineOutcome::Skip);
    };
    if data == "[DONE]" {
        return Ok(LineOutcome::Done);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| AppError::Transport(format!("Malformed completion chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(AppError::Upstream {
            status: 200,
            message: error.message,
        });
    }
    if completion_id.is_none() {
        *completion_id = chunk.id;
    }

    let delta: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();
    Ok(LineOutcome::Delta(delta))
}

#[async_trait]
impl ProviderAdapter for OpenAiClient {
    fn name(&self) -> &str {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(provider = %self.provider, model = %self.model))]
    async fn generate(&self, request: GenerateRequest) -> AppResult<AdapterStream> {
        if self.key_required && self.api_key.is_none() {
            return Err(AppError::Authentication(format!(
                "{} requires an API key",
                self.provider
            )));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(&request.history, &request.question),
            stream: true,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        info!(endpoint = %self.endpoint, history = request.history.len(), "Starting completion");
        let response = http::send(builder, &request.cancel, self.provider).await?;

        let mut body = http::body_stream(response);
        let cancel = request.cancel;
        let model = self.model.clone();

        Ok(Box::pin(try_stream! {
            let mut buffer = SseLineBuffer::new();
            let mut answer = String::new();
            let mut completion_id = None;
            let mut finished = false;

            'read: while let Some(bytes) = next_chunk(&mut body, &cancel).await? {
                for line in buffer.feed(&bytes) {
                    match parse_line(&line, &mut completion_id)? {
                        LineOutcome::Delta(delta) if !delta.is_empty() => {
                            answer.push_str(&delta);
                            yield StreamEvent::Progress(answer.clone());
                        }
                        LineOutcome::Done => {
                            finished = true;
                            break 'read;
                        }
                        _ => {}
                    }
                }
            }

            // The marker may arrive without a trailing newline
            if !finished {
                if let Some(line) = buffer.finish() {
                    let outcome = parse_line(&line, &mut completion_id)?;
                    finished = matches!(outcome, LineOutcome::Done);
                }
            }
            if !finished {
                Err::<(), _>(AppError::Transport(
                    "Completion stream closed before [DONE]".to_string(),
                ))?;
            }

            debug!(chars = answer.len(), "Completion finished");
            yield StreamEvent::Completed(ContinuityBundle::from_typed(&ApiContinuity {
                model,
                last_completion_id: completion_id,
            })?);
        }))
    }
}
