//! Mock ChatGPT web backend
//!
//! Provides a wiremock-based mock for POST /backend-api/conversation, which
//! streams the whole assistant message in every frame.

use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::sse_body;

pub const CONVERSATION_PATH: &str = "/backend-api/conversation";

/// Mock web backend wrapper
pub struct MockChatGptWeb {
    server: MockServer,
}

impl MockChatGptWeb {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub async fn request_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }

    /// Stream cumulative `parts` for requests carrying `access_token`
    pub async fn mock_conversation(&self, access_token: &str, parts: &[&str]) {
        let mut frames: Vec<String> = parts
            .iter()
            .map(|text| {
                json!({
                    "message": {
                        "id": "msg-2",
                        "author": {"role": "assistant"},
                        "content": {"content_type": "text", "parts": [text]}
                    },
                    "conversation_id": "conv-web-1",
                    "error": null
                })
                .to_string()
            })
            .collect();
        frames.push("[DONE]".to_string());

        Mock::given(method("POST"))
            .and(path(CONVERSATION_PATH))
            .and(header("Authorization", format!("Bearer {}", access_token).as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(frames))
                    .insert_header("Content-Type", "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }
}
