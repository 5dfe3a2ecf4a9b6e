//! Mock Bing chat server for testing
//!
//! Provides wiremock-based mocks for:
//! - GET /turing/conversation/create - Open a hosted conversation
//! - POST /turing/conversation/chat - Stream one turn

use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::sse_body;

/// Mock Bing server wrapper
pub struct MockBingServer {
    server: MockServer,
}

impl MockBingServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Bodies of the chat requests received so far
    pub async fn chat_bodies(&self) -> Vec<Value> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == "/turing/conversation/chat")
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }

    /// Conversation creation succeeds, at most `times` times
    pub async fn mock_create_success(&self, user_token: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path("/turing/conversation/create"))
            .and(header("cookie", format!("_U={}", user_token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversationId": "conv-1",
                "clientId": "client-1",
                "conversationSignature": "sig-1",
                "result": {"value": "Success", "message": null}
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Conversation creation rejected for an invalid cookie
    pub async fn mock_create_unauthorized(&self) {
        Mock::given(method("GET"))
            .and(path("/turing/conversation/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"value": "UnauthorizedRequest", "message": "Sorry, you need to login first"}
            })))
            .mount(&self.server)
            .await;
    }

    /// A turn streaming the given cumulative updates and ending with `final_text`
    pub async fn mock_chat_stream(&self, updates: &[&str], final_text: &str) {
        let mut records: Vec<String> = updates
            .iter()
            .map(|text| {
                json!({
                    "type": 1,
                    "arguments": [{"messages": [{"text": text, "author": "bot"}]}]
                })
                .to_string()
            })
            .collect();
        records.push(
            json!({
                "type": 2,
                "item": {
                    "messages": [
                        {"text": "question", "author": "user"},
                        {"text": "Searching the web", "author": "bot", "messageType": "InternalSearchQuery"},
                        {"text": final_text, "author": "bot"}
                    ],
                    "result": {"value": "Success"}
                }
            })
            .to_string(),
        );

        Mock::given(method("POST"))
            .and(path("/turing/conversation/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(records))
                    .insert_header("Content-Type", "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }
}
