//! Channel session management
//!
//! A [`Channel`] is the bridge's end of one caller connection: an inbound
//! message queue and an outbound frame queue. [`ChannelSessionManager`] owns
//! the channel for the lifetime of one generation. It listens for stop
//! requests and disconnects, and it is the only writer of outbound frames.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{error::AppError, session::Session};

use super::cancel::{CancelReason, CancelTrigger};

/// Caller → bridge message. Anything other than a stop request is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub stop: bool,
}

impl ClientMessage {
    pub fn stop() -> Self {
        Self { stop: true }
    }
}

/// Bridge → caller frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// `{answer, done, session}`; `session` is null until the final frame
    Answer {
        answer: String,
        done: bool,
        session: Option<Session>,
    },
    /// `{done: true}` after a stop, or `{done: true, answer}` on shutdown
    Stopped {
        done: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
    },
    /// `{error, code}`
    Error { error: String, code: String },
}

impl ServerFrame {
    pub fn partial(answer: impl Into<String>) -> Self {
        ServerFrame::Answer {
            answer: answer.into(),
            done: false,
            session: None,
        }
    }

    pub fn completed(answer: impl Into<String>, session: Session) -> Self {
        ServerFrame::Answer {
            answer: answer.into(),
            done: true,
            session: Some(session),
        }
    }

    pub fn stopped(answer: Option<String>) -> Self {
        ServerFrame::Stopped { done: true, answer }
    }

    pub fn error(err: &AppError) -> Self {
        ServerFrame::Error {
            error: err.public_message(),
            code: err.code().to_string(),
        }
    }

    /// Whether no further frame may follow this one
    pub fn is_terminal(&self) -> bool {
        match self {
            ServerFrame::Answer { done, .. } => *done,
            ServerFrame::Stopped { .. } | ServerFrame::Error { .. } => true,
        }
    }
}

/// Bridge end of a caller connection
#[derive(Debug)]
pub struct Channel {
    pub inbound: mpsc::Receiver<ClientMessage>,
    pub outbound: mpsc::Sender<ServerFrame>,
}

/// Caller end of an in-process channel
#[derive(Debug)]
pub struct CallerEnd {
    pub tx: mpsc::Sender<ClientMessage>,
    pub rx: mpsc::Receiver<ServerFrame>,
}

impl CallerEnd {
    /// Drop the sending half, which the bridge observes as a disconnect
    pub fn disconnect(self) -> mpsc::Receiver<ServerFrame> {
        self.rx
    }
}

impl Channel {
    /// Connected in-process pair; `buffer` bounds each direction
    pub fn pair(buffer: usize) -> (Channel, CallerEnd) {
        let (client_tx, client_rx) = mpsc::channel(buffer);
        let (server_tx, server_rx) = mpsc::channel(buffer);
        (
            Channel {
                inbound: client_rx,
                outbound: server_tx,
            },
            CallerEnd {
                tx: client_tx,
                rx: server_rx,
            },
        )
    }

    /// Answer with an error frame and drop the channel without starting a generation
    pub async fn reject(self, err: &AppError) {
        let _ = self.outbound.send(ServerFrame::error(err)).await;
    }
}

/// Serialized writer that goes silent after the terminal frame.
///
/// The lock only guards the sender slot and is never held across an await,
/// so closing the writer is immediate even while a send waits for capacity.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    tx: Arc<Mutex<Option<mpsc::Sender<ServerFrame>>>>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<ServerFrame>>> {
        self.tx.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send a frame. Returns false if the writer is closed or the caller is gone.
    ///
    /// Capacity is reserved before the closed check, so a frame is never
    /// queued behind the terminal one.
    pub async fn send(&self, frame: ServerFrame) -> bool {
        let tx = self.slot().clone();
        let Some(tx) = tx else {
            return false;
        };
        let Ok(permit) = tx.reserve().await else {
            return false;
        };

        let slot = self.slot();
        if slot.is_none() {
            return false;
        }
        permit.send(frame);
        true
    }

    /// Close the writer and hand back its sender for the terminal frame.
    /// Only the first caller gets it.
    fn take(&self) -> Option<mpsc::Sender<ServerFrame>> {
        self.slot().take()
    }

    /// Send a terminal frame and close the writer
    pub async fn finish(&self, frame: ServerFrame) -> bool {
        match self.take() {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        }
    }

    pub fn close(&self) {
        self.take();
    }

    pub fn is_closed(&self) -> bool {
        self.slot().is_none()
    }
}

/// Owns a channel for the duration of one generation
#[derive(Debug)]
pub struct ChannelSessionManager {
    writer: ChannelWriter,
    listener: Option<JoinHandle<()>>,
}

impl ChannelSessionManager {
    /// Take over the channel and start observing stop requests and disconnects
    pub fn attach(channel: Channel, trigger: CancelTrigger) -> Self {
        let Channel { inbound, outbound } = channel;
        let writer = ChannelWriter::new(outbound);
        let listener = tokio::spawn(listen(inbound, writer.clone(), trigger));

        Self {
            writer,
            listener: Some(listener),
        }
    }

    /// Forward a non-terminal frame
    pub async fn emit(&self, frame: ServerFrame) -> bool {
        self.writer.send(frame).await
    }

    /// Stop observing the caller. Safe to call more than once.
    pub fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!("Channel listeners removed");
        }
    }

    /// Whether the terminal frame has already been written (e.g. a stop acknowledgement)
    pub fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }

    /// Detach, then write the terminal frame
    pub async fn finish(&mut self, frame: ServerFrame) -> bool {
        self.detach();
        self.writer.finish(frame).await
    }

    /// Detach, then report the failure to the caller
    pub async fn fail(&mut self, err: &AppError) -> bool {
        self.finish(ServerFrame::error(err)).await
    }

    /// Detach and close without writing anything further
    pub fn close(&mut self) {
        self.detach();
        self.writer.close();
    }
}

impl Drop for ChannelSessionManager {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn listen(
    mut inbound: mpsc::Receiver<ClientMessage>,
    writer: ChannelWriter,
    trigger: CancelTrigger,
) {
    while let Some(message) = inbound.recv().await {
        if message.stop {
            debug!("Stop requested by caller");
            // Close before firing so no partial can overtake the acknowledgement.
            // Delivery runs on its own task: the caller may not be reading, and
            // detaching this listener must not drop the frame.
            if let Some(tx) = writer.take() {
                trigger.fire(CancelReason::StopRequested);
                tokio::spawn(async move {
                    let _ = tx.send(ServerFrame::stopped(None)).await;
                });
            }
            return;
        }
    }

    debug!("Caller disconnected");
    trigger.fire(CancelReason::Disconnected);
}
