//! Hosted-session client (Bing chat)
//!
//! The backend keeps the conversation server-side. A conversation is created
//! once per session, and every later turn replays its identifiers together with
//! an invocation counter. Turns stream `data:` records: type 1 updates carry the
//! cumulative bot text, a type 2 record carries the final result.

use async_stream::try_stream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::{
    config::ModelMode,
    error::{AppError, AppResult},
    session::ContinuityBundle,
    streaming::{next_chunk, sse_data, Sanitizer, SseLineBuffer},
};

use super::{http, names, AdapterStream, GenerateRequest, ProviderAdapter, StreamEvent};

/// Identifiers that resume a hosted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BingContinuity {
    pub conversation_id: String,
    pub conversation_signature: String,
    pub client_id: String,
    pub invocation_id: u32,
}

impl BingContinuity {
    /// Identifiers for the turn after this one
    fn next_turn(&self) -> AppResult<Self> {
        let invocation_id = self.invocation_id.checked_add(1).ok_or_else(|| {
            AppError::Transport("Conversation invocation counter exhausted".to_string())
        })?;
        Ok(Self {
            invocation_id,
            ..self.clone()
        })
    }
}

#[derive(Debug, Deserialize)]
struct ResultStatus {
    value: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationResponse {
    conversation_id: Option<String>,
    client_id: Option<String>,
    conversation_signature: Option<String>,
    result: ResultStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage<'a> {
    text: &'a str,
    author: &'static str,
    message_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    conversation_id: &'a str,
    conversation_signature: &'a str,
    client_id: &'a str,
    invocation_id: u32,
    tone: &'static str,
    message: ChatMessage<'a>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotMessage {
    #[serde(default)]
    text: String,
    author: String,
    message_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateArguments {
    #[serde(default)]
    messages: Vec<BotMessage>,
}

#[derive(Debug, Deserialize)]
struct FinalItem {
    #[serde(default)]
    messages: Vec<BotMessage>,
    result: ResultStatus,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    arguments: Vec<UpdateArguments>,
    item: Option<FinalItem>,
}

/// Latest reply text among bot chat messages (search notices and the like are skipped)
fn reply_text(messages: &[BotMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.author == "bot" && m.message_type.is_none())
        .map(|m| m.text.as_str())
}

fn check_result(result: &ResultStatus) -> AppResult<()> {
    let message = result.message.clone().unwrap_or_else(|| result.value.clone());
    match result.value.as_str() {
        "Success" => Ok(()),
        "UnauthorizedRequest" | "Forbidden" => Err(AppError::Authentication(message)),
        "Throttled" => Err(AppError::Upstream {
            status: 429,
            message,
        }),
        _ => Err(AppError::Upstream {
            status: 502,
            message,
        }),
    }
}

/// Tone option understood by the backend
pub fn tone_for(mode: ModelMode) -> &'static str {
    match mode {
        ModelMode::Balanced => "harmonyv3",
        ModelMode::Creative => "h3imaginative",
        ModelMode::Precise => "h3precise",
        ModelMode::Fast => "galileo",
    }
}

enum RecordOutcome {
    Progress(String),
    Final(Option<String>),
    Skip,
}

fn parse_record(line: &str) -> AppResult<RecordOutcome> {
    let Some(data) = sse_data(line) else {
        return Ok(RecordOutcome::Skip);
    };

    let record: Record = serde_json::from_str(data)
        .map_err(|e| AppError::Transport(format!("Malformed chat record: {}", e)))?;

    match record.kind {
        1 => Ok(record
            .arguments
            .iter()
            .find_map(|args| reply_text(&args.messages))
            .map(|text| RecordOutcome::Progress(text.to_string()))
            .unwrap_or(RecordOutcome::Skip)),
        2 => {
            let item = record
                .item
                .ok_or_else(|| AppError::Transport("Final record without item".to_string()))?;
            check_result(&item.result)?;
            Ok(RecordOutcome::Final(
                reply_text(&item.messages).map(str::to_string),
            ))
        }
        _ => Ok(RecordOutcome::Skip),
    }
}

/// Client for the hosted-session backend
pub struct BingWebClient {
    client: reqwest::Client,
    base_url: String,
    user_token: Option<String>,
}

impl BingWebClient {
    pub fn new(client: reqwest::Client, base_url: &str, user_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_token,
        }
    }

    fn with_cookie(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.user_token {
            Some(token) => builder.header(reqwest::header::COOKIE, format!("_U={}", token)),
            None => builder,
        }
    }

    /// Open a new server-side conversation
    #[instrument(skip(self, cancel))]
    async fn create_conversation(&self, cancel: &CancellationToken) -> AppResult<BingContinuity> {
        let url = format!("{}/turing/conversation/create", self.base_url);
        let builder = self.with_cookie(self.client.get(&url));
        let response = http::send(builder, cancel, names::BING_WEB).await?;

        let created: CreateConversationResponse = response.json().await?;
        check_result(&created.result)?;

        match (
            created.conversation_id,
            created.client_id,
            created.conversation_signature,
        ) {
            (Some(conversation_id), Some(client_id), Some(conversation_signature)) => {
                info!(conversation_id = %conversation_id, "Created hosted conversation");
                Ok(BingContinuity {
                    conversation_id,
                    conversation_signature,
                    client_id,
                    invocation_id: 0,
                })
            }
            _ => Err(AppError::Transport(
                "Conversation created without identifiers".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ProviderAdapter for BingWebClient {
    fn name(&self) -> &str {
        names::BING_WEB
    }

    fn model(&self) -> &str {
        "bing"
    }

    fn sanitizer(&self) -> Sanitizer {
        Sanitizer::citation_markers()
    }

    #[instrument(
        skip(self, request),
        fields(provider = names::BING_WEB, mode = %request.mode)
    )]
    async fn generate(&self, request: GenerateRequest) -> AppResult<AdapterStream> {
        let continuity = match &request.resume {
            Some(bundle) => {
                let continuity: BingContinuity = bundle.to_typed()?;
                debug!(
                    conversation_id = %continuity.conversation_id,
                    invocation_id = continuity.invocation_id,
                    "Resuming hosted conversation"
                );
                continuity
            }
            None => self.create_conversation(&request.cancel).await?,
        };
        let next = continuity.next_turn()?;

        let url = format!("{}/turing/conversation/chat", self.base_url);
        let body = ChatRequest {
            conversation_id: &continuity.conversation_id,
            conversation_signature: &continuity.conversation_signature,
            client_id: &continuity.client_id,
            invocation_id: continuity.invocation_id,
            tone: tone_for(request.mode),
            message: ChatMessage {
                text: &request.question,
                author: "user",
                message_type: "Chat",
            },
        };
        let builder = self.with_cookie(self.client.post(&url).json(&body));
        let response = http::send(builder, &request.cancel, names::BING_WEB).await?;

        let mut body = http::body_stream(response);
        let cancel = request.cancel;

        Ok(Box::pin(try_stream! {
            let mut buffer = SseLineBuffer::new();
            let mut last = String::new();

            'read: while let Some(bytes) = next_chunk(&mut body, &cancel).await? {
                for line in buffer.feed(&bytes) {
                    match parse_record(&line)? {
                        RecordOutcome::Progress(text) => {
                            if text != last {
                                last = text.clone();
                                yield StreamEvent::Progress(text);
                            }
                        }
                        RecordOutcome::Final(text) => {
                            if let Some(text) = text.filter(|t| !t.is_empty() && *t != last) {
                                yield StreamEvent::Progress(text);
                            }
                            yield StreamEvent::Completed(ContinuityBundle::from_typed(&next)?);
                            break 'read;
                        }
                        RecordOutcome::Skip => {}
                    }
                }
            }
        }))
    }
}
