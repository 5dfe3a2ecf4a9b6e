//! Browser-session client (ChatGPT web backend)
//!
//! Authenticates with the access token of a signed-in browser session. Each
//! streamed frame carries the whole assistant message so far, so no local
//! accumulation is needed. Continuity is the conversation id plus the id of the
//! last assistant message, which becomes the parent of the next user message.

use async_stream::try_stream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    config::UserConfig,
    error::{AppError, AppResult},
    session::ContinuityBundle,
    streaming::{next_chunk, sse_data, SseLineBuffer},
};

use super::{http, names, AdapterStream, GenerateRequest, ProviderAdapter, StreamEvent};

/// Identifiers that continue a web conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebContinuity {
    pub conversation_id: String,
    pub parent_message_id: String,
}

#[derive(Debug, Serialize)]
struct Author {
    role: &'static str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    content_type: &'static str,
    parts: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    id: String,
    author: Author,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct ConversationRequest<'a> {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    messages: [OutgoingMessage<'a>; 1],
    model: &'a str,
    parent_message_id: String,
}

#[derive(Debug, Deserialize)]
struct IncomingContent {
    #[serde(default)]
    parts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    id: String,
    content: IncomingContent,
}

#[derive(Debug, Deserialize)]
struct Frame {
    message: Option<IncomingMessage>,
    conversation_id: Option<String>,
    error: Option<serde_json::Value>,
}

/// Client for the web conversation backend
pub struct ChatGptWebClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
    model: String,
}

impl ChatGptWebClient {
    pub fn new(
        client: reqwest::Client,
        user: &UserConfig,
        access_token: Option<String>,
        model: &str,
    ) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}{}",
                user.custom_chatgpt_web_api_url.trim_end_matches('/'),
                user.custom_chatgpt_web_api_path
            ),
            access_token,
            model: model.to_string(),
        }
    }
}

/// Conversation id, last message id and cumulative text of one frame
struct FrameUpdate {
    conversation_id: Option<String>,
    message_id: String,
    text: String,
}

enum FrameOutcome {
    Update(FrameUpdate),
    Done,
    Skip,
}

fn parse_frame(line: &str) -> AppResult<FrameOutcome> {
    let Some(data) = sse_data(line) else {
        return Ok(FrameOutcome::Skip);
    };
    if data == "[DONE]" {
        return Ok(FrameOutcome::Done);
    }

    let frame: Frame = match serde_json::from_str(data) {
        Ok(frame) => frame,
        // The backend interleaves non-JSON keep-alive payloads
        Err(_) => return Ok(FrameOutcome::Skip),
    };

    if let Some(error) = frame.error.filter(|e| !e.is_null()) {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(AppError::Upstream {
            status: 200,
            message,
        });
    }

    Ok(match frame.message {
        Some(message) => FrameOutcome::Update(FrameUpdate {
            conversation_id: frame.conversation_id,
            message_id: message.id,
            text: message.content.parts.into_iter().next().unwrap_or_default(),
        }),
        None => FrameOutcome::Skip,
    })
}

#[async_trait]
impl ProviderAdapter for ChatGptWebClient {
    fn name(&self) -> &str {
        names::CHATGPT_WEB
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(provider = names::CHATGPT_WEB, model = %self.model))]
    async fn generate(&self, request: GenerateRequest) -> AppResult<AdapterStream> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            AppError::Authentication("chatgptWeb requires an access token".to_string())
        })?;

        let resume: Option<WebContinuity> =
            request.resume.as_ref().map(|b| b.to_typed()).transpose()?;

        let body = ConversationRequest {
            action: "next",
            conversation_id: resume.as_ref().map(|r| r.conversation_id.as_str()),
            messages: [OutgoingMessage {
                id: Uuid::new_v4().to_string(),
                author: Author { role: "user" },
                content: Content {
                    content_type: "text",
                    parts: [&request.question],
                },
            }],
            model: &self.model,
            parent_message_id: resume
                .as_ref()
                .map(|r| r.parent_message_id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };

        let builder = self.client.post(&self.endpoint).bearer_auth(token).json(&body);
        let response = http::send(builder, &request.cancel, names::CHATGPT_WEB).await?;

        let mut body = http::body_stream(response);
        let cancel = request.cancel;
        let mut conversation_id = resume.map(|r| r.conversation_id);

        Ok(Box::pin(try_stream! {
            let mut buffer = SseLineBuffer::new();
            let mut message_id: Option<String> = None;
            let mut last = String::new();
            let mut done = false;

            'read: while let Some(bytes) = next_chunk(&mut body, &cancel).await? {
                for line in buffer.feed(&bytes) {
                    match parse_frame(&line)? {
                        FrameOutcome::Update(update) => {
                            if update.conversation_id.is_some() {
                                conversation_id = update.conversation_id;
                            }
                            message_id = Some(update.message_id);
                            if !update.text.is_empty() && update.text != last {
                                last = update.text.clone();
                                yield StreamEvent::Progress(update.text);
                            }
                        }
                        FrameOutcome::Done => {
                            done = true;
                            break 'read;
                        }
                        FrameOutcome::Skip => {}
                    }
                }
            }

            if done {
                match (conversation_id, message_id) {
                    (Some(conversation_id), Some(parent_message_id)) => {
                        debug!(
                            conversation_id = %conversation_id,
                            "Web conversation turn finished"
                        );
                        yield StreamEvent::Completed(ContinuityBundle::from_typed(&WebContinuity {
                            conversation_id,
                            parent_message_id,
                        })?);
                    }
                    _ => {
                        Err::<(), _>(AppError::Transport(
                            "Conversation finished without identifiers".to_string(),
                        ))?;
                    }
                }
            }
        }))
    }
}
