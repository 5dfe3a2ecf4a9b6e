//! WebSocket channel endpoint
//!
//! `GET /v1/channel?provider=&model=` routes the selection first and only then
//! upgrades, so configuration errors come back as plain HTTP errors. After the
//! upgrade the caller sends one opening frame `{question, session?}`; from then
//! on only `{stop: true}` is meaningful. The socket is closed after the
//! terminal frame.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    bridge::{CallerEnd, Channel, ClientMessage, GenerationOutcome, PreparedGeneration, ServerFrame},
    dispatch::RouteTarget,
    error::{AppError, AppResult},
    middleware::auth::caller_token,
    routes::metrics::{channel_closed, channel_opened, record_cancellation, record_generation},
    session::Session,
    AppState,
};

/// Frames buffered per direction between the socket and the bridge
const CHANNEL_BUFFER: usize = 32;

/// Query parameters of the channel endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ChannelQuery {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub access_token: Option<String>,
}

/// First frame sent by the caller after the upgrade
#[derive(Debug, Deserialize)]
pub struct StartFrame {
    pub question: String,
    #[serde(default)]
    pub session: Option<Session>,
}

impl StartFrame {
    fn parse(text: &str) -> AppResult<Self> {
        let frame: StartFrame = serde_json::from_str(text)
            .map_err(|e| AppError::BadRequest(format!("Invalid opening frame: {}", e)))?;
        if frame.question.trim().is_empty() {
            return Err(AppError::BadRequest("Question must not be empty".to_string()));
        }
        Ok(frame)
    }
}

/// Channel upgrade handler
#[instrument(skip_all, fields(provider = ?query.provider, model = ?query.model))]
pub async fn open_channel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChannelQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> AppResult<Response> {
    let token = caller_token(&headers, query.access_token.as_deref());
    let target = RouteTarget {
        provider: query.provider,
        model: query.model,
    };

    let prepared = state.bridge.prepare(&target, token).await?;
    let ws = ws.ok_or_else(|| AppError::BadRequest("WebSocket upgrade required".to_string()))?;

    debug!(provider = %prepared.provider(), model = %prepared.model(), "Upgrading channel");
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, prepared))
        .into_response())
}

type SocketSink = SplitSink<WebSocket, Message>;

async fn send_frame(sender: &mut SocketSink, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize frame");
            false
        }
    }
}

/// Wait for the opening frame. `None` means the caller left before sending one.
async fn read_start(receiver: &mut SplitStream<WebSocket>) -> Option<AppResult<StartFrame>> {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => return Some(StartFrame::parse(&text)),
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
    None
}

/// Forward socket messages to the bridge until the socket closes.
///
/// Dropping `tx` on return is what the bridge sees as a disconnect.
async fn forward_inbound(
    mut receiver: SplitStream<WebSocket>,
    tx: tokio::sync::mpsc::Sender<ClientMessage>,
) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!(error = %e, "Ignoring unreadable caller message"),
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!(error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, prepared: PreparedGeneration) {
    let (mut sender, mut receiver) = socket.split();

    let start = match read_start(&mut receiver).await {
        Some(Ok(start)) => start,
        Some(Err(err)) => {
            send_frame(&mut sender, &ServerFrame::error(&err)).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
        None => {
            debug!("Caller left before asking a question");
            return;
        }
    };

    channel_opened();
    let (channel, CallerEnd { tx, mut rx }) = Channel::pair(CHANNEL_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if !send_frame(&mut sender, &frame).await {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });
    let reader = tokio::spawn(forward_inbound(receiver, tx));

    let provider = prepared.provider().to_string();
    let mut session = start.session.unwrap_or_default();
    let started = Instant::now();

    let result = state
        .bridge
        .generate(prepared, &start.question, &mut session, channel)
        .await;
    let elapsed = started.elapsed().as_secs_f64();

    match &result {
        Ok(GenerationOutcome::Cancelled { reason, .. }) => record_cancellation(reason.as_str()),
        Ok(GenerationOutcome::Completed { .. }) => {}
        Err(err) => debug!(code = err.code(), "Generation ended with error"),
    }
    let outcome = match &result {
        Ok(outcome) => outcome.label(),
        Err(err) => err.code(),
    };
    record_generation(&provider, outcome, elapsed);
    info!(provider = %provider, outcome = outcome, elapsed_secs = elapsed, "Channel finished");

    reader.abort();
    let _ = writer.await;
    channel_closed();
}
