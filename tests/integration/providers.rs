//! Built-in provider tests
//!
//! Each adapter runs through the bridge against a wiremock backend that
//! speaks its wire format.

use pretty_assertions::assert_eq;
use serde_json::json;

use chatbridge::{
    bridge::{Bridge, Channel, GenerationOutcome, ServerFrame},
    config::UserConfig,
    dispatch::RouteTarget,
    error::{AppError, AppResult},
    provider::names,
    session::{ContinuityBundle, Session},
};

use crate::common::{builtin_bridge, constants::TEST_TOKEN, drain, partial_answers};
use crate::mocks::{MockBingServer, MockChatGptWeb, MockOpenAiServer};

/// Run one generation for `model`, returning the result and every frame sent
async fn run(
    bridge: &Bridge,
    model: &str,
    token: Option<&str>,
    question: &str,
    session: &mut Session,
) -> (AppResult<GenerationOutcome>, Vec<ServerFrame>) {
    let prepared = bridge
        .prepare(
            &RouteTarget::new(None, Some(model)),
            token.map(str::to_string),
        )
        .await
        .expect("model should route");
    let (channel, mut caller) = Channel::pair(64);

    let result = bridge.generate(prepared, question, session, channel).await;
    let frames = drain(&mut caller.rx).await;
    (result, frames)
}

fn error_code(frames: &[ServerFrame]) -> Option<&str> {
    match frames.last() {
        Some(ServerFrame::Error { code, .. }) => Some(code.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn test_bing_creates_then_resumes_conversation() {
    let bing = MockBingServer::start().await;
    bing.mock_create_success(TEST_TOKEN, 1).await;
    bing.mock_chat_stream(&["Hel", "Hello[^1^]"], "Hello[^1^] world").await;

    let bridge = builtin_bridge(UserConfig::default(), &bing.uri());
    let mut session = Session::new();

    let (result, frames) =
        run(&bridge, "bingFree4", Some(TEST_TOKEN), "question", &mut session).await;

    assert_eq!(
        result.unwrap(),
        GenerationOutcome::Completed {
            answer: "Hello world".into()
        }
    );
    assert_eq!(partial_answers(&frames), vec!["Hel", "Hello", "Hello world"]);
    assert_eq!(
        session.bundle_for(names::BING_WEB).unwrap().as_value(),
        &json!({
            "conversationId": "conv-1",
            "conversationSignature": "sig-1",
            "clientId": "client-1",
            "invocationId": 1
        })
    );

    let (result, _) =
        run(&bridge, "bingFree4", Some(TEST_TOKEN), "follow up", &mut session).await;
    assert!(result.is_ok());

    let bodies = bing.chat_bodies().await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["invocationId"], 0);
    assert_eq!(bodies[0]["tone"], "harmonyv3");
    assert_eq!(bodies[0]["message"]["text"], "question");
    assert_eq!(bodies[1]["invocationId"], 1);
    assert_eq!(bodies[1]["conversationId"], "conv-1");
    assert_eq!(
        session.bundle_for(names::BING_WEB).unwrap().as_value()["invocationId"],
        2
    );
    assert_eq!(session.conversation_records.len(), 2);
}

#[tokio::test]
async fn test_bing_rejected_cookie_is_authentication_error() {
    let bing = MockBingServer::start().await;
    bing.mock_create_unauthorized().await;

    let bridge = builtin_bridge(UserConfig::default(), &bing.uri());
    let mut session = Session::new();

    let (result, frames) =
        run(&bridge, "bingFree4", Some("stale"), "question", &mut session).await;

    assert!(matches!(result, Err(AppError::Authentication(_))));
    assert_eq!(error_code(&frames), Some("AUTHENTICATION_ERROR"));
    assert!(session.provider_state.is_empty());
}

#[tokio::test]
async fn test_bing_exhausted_invocation_counter_fails_before_request() {
    let bing = MockBingServer::start().await;
    let bridge = builtin_bridge(UserConfig::default(), &bing.uri());
    let mut session = Session::new();
    session.provider_state.insert(
        names::BING_WEB.to_string(),
        ContinuityBundle::new(json!({
            "conversationId": "conv-1",
            "conversationSignature": "sig-1",
            "clientId": "client-1",
            "invocationId": u32::MAX
        })),
    );
    let original = session.clone();

    let (result, frames) =
        run(&bridge, "bingFree4", Some(TEST_TOKEN), "question", &mut session).await;

    assert!(matches!(result, Err(AppError::Transport(_))));
    assert_eq!(error_code(&frames), Some("TRANSPORT_ERROR"));
    assert_eq!(session, original);
    assert!(bing.chat_bodies().await.is_empty());
}

#[tokio::test]
async fn test_openai_accumulates_deltas_and_rebuilds_history() {
    let openai = MockOpenAiServer::start().await;
    openai.mock_stream("sk-test", &["Hel", "lo"]).await;

    let mut user = UserConfig::default();
    user.custom_openai_api_url = openai.uri();
    user.api_key = Some("sk-test".into());
    let bridge = builtin_bridge(user, "http://127.0.0.1:9");
    let mut session = Session::new();

    let (result, frames) = run(&bridge, "chatgptApi35", None, "Hi", &mut session).await;

    assert_eq!(
        result.unwrap(),
        GenerationOutcome::Completed {
            answer: "Hello".into()
        }
    );
    assert_eq!(partial_answers(&frames), vec!["Hel", "Hello"]);
    assert_eq!(
        session.bundle_for(names::CHATGPT_API).unwrap().as_value(),
        &json!({"model": "gpt-3.5-turbo", "lastCompletionId": "chatcmpl-1"})
    );

    let (result, _) = run(&bridge, "chatgptApi35", None, "And then?", &mut session).await;
    assert!(result.is_ok());

    let bodies = openai.request_bodies().await;
    assert_eq!(bodies[0]["stream"], true);
    assert_eq!(bodies[0]["model"], "gpt-3.5-turbo");
    let messages = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1], json!({"role": "user", "content": "Hi"}));
    assert_eq!(messages[2], json!({"role": "assistant", "content": "Hello"}));
    assert_eq!(messages[3], json!({"role": "user", "content": "And then?"}));
}

#[tokio::test]
async fn test_openai_stream_without_done_marker_is_transport_error() {
    let openai = MockOpenAiServer::start().await;
    openai.mock_truncated_stream("sk-test", &["Hel", "lo"]).await;

    let mut user = UserConfig::default();
    user.custom_openai_api_url = openai.uri();
    user.api_key = Some("sk-test".into());
    let bridge = builtin_bridge(user, "http://127.0.0.1:9");
    let mut session = Session::new();

    let (result, frames) = run(&bridge, "chatgptApi35", None, "Hi", &mut session).await;

    assert!(matches!(result, Err(AppError::Transport(_))));
    assert_eq!(partial_answers(&frames), vec!["Hel", "Hello"]);
    assert_eq!(error_code(&frames), Some("TRANSPORT_ERROR"));
    assert!(session.conversation_records.is_empty());
}

#[tokio::test]
async fn test_openai_rejected_key_surfaces_error_frame() {
    let openai = MockOpenAiServer::start().await;
    openai.mock_unauthorized().await;

    let mut user = UserConfig::default();
    user.custom_openai_api_url = openai.uri();
    let bridge = builtin_bridge(user, "http://127.0.0.1:9");
    let mut session = Session::new();

    let (result, frames) = run(&bridge, "chatgptApi35", Some("sk-bad"), "Hi", &mut session).await;

    assert!(matches!(result, Err(AppError::Authentication(_))));
    assert_eq!(error_code(&frames), Some("AUTHENTICATION_ERROR"));
    assert!(partial_answers(&frames).is_empty());
}

#[tokio::test]
async fn test_openai_without_key_fails_before_network() {
    let bridge = builtin_bridge(UserConfig::default(), "http://127.0.0.1:9");
    let mut session = Session::new();

    let (result, frames) = run(&bridge, "chatgptApi35", None, "Hi", &mut session).await;

    assert!(matches!(result, Err(AppError::Authentication(_))));
    assert_eq!(error_code(&frames), Some("AUTHENTICATION_ERROR"));
}

#[tokio::test]
async fn test_custom_endpoint_uses_configured_model() {
    let server = MockOpenAiServer::start().await;
    server.mock_open_stream("/local/chat", &["A", "B"]).await;

    let mut user = UserConfig::default();
    user.custom_model_api_url = format!("{}/local/chat", server.uri());
    user.custom_model_name = "rwkv-4".into();
    let bridge = builtin_bridge(user, "http://127.0.0.1:9");
    let mut session = Session::new();

    let (result, _) = run(&bridge, "customModel", None, "Hi", &mut session).await;

    assert_eq!(
        result.unwrap(),
        GenerationOutcome::Completed { answer: "AB".into() }
    );
    assert_eq!(server.request_bodies().await[0]["model"], "rwkv-4");
    assert!(session.bundle_for(names::CUSTOM_API).is_some());
}

#[tokio::test]
async fn test_web_session_threads_parent_message() {
    let web = MockChatGptWeb::start().await;
    web.mock_conversation(TEST_TOKEN, &["Hi", "Hi there"]).await;

    let mut user = UserConfig::default();
    user.custom_chatgpt_web_api_url = web.uri();
    let bridge = builtin_bridge(user, "http://127.0.0.1:9");
    let mut session = Session::new();

    let (result, frames) =
        run(&bridge, "chatgptFree35", Some(TEST_TOKEN), "Hello", &mut session).await;

    assert!(result.is_ok());
    assert_eq!(partial_answers(&frames), vec!["Hi", "Hi there"]);
    assert_eq!(
        session.bundle_for(names::CHATGPT_WEB).unwrap().as_value(),
        &json!({"conversationId": "conv-web-1", "parentMessageId": "msg-2"})
    );

    run(&bridge, "chatgptFree35", Some(TEST_TOKEN), "Again", &mut session)
        .await
        .0
        .unwrap();

    let bodies = web.request_bodies().await;
    assert!(bodies[0].get("conversation_id").is_none());
    assert_eq!(bodies[0]["messages"][0]["content"]["parts"][0], "Hello");
    assert_eq!(bodies[1]["conversation_id"], "conv-web-1");
    assert_eq!(bodies[1]["parent_message_id"], "msg-2");
}

#[tokio::test]
async fn test_web_session_requires_access_token() {
    let bridge = builtin_bridge(UserConfig::default(), "http://127.0.0.1:9");
    let mut session = Session::new();

    let (result, frames) = run(&bridge, "chatgptFree35", None, "Hello", &mut session).await;

    assert!(matches!(result, Err(AppError::Authentication(_))));
    assert_eq!(error_code(&frames), Some("AUTHENTICATION_ERROR"));
}
