//! Streaming utilities shared by provider adapters
//!
//! Upstream backends stream Server-Sent Events whose lines can be split across
//! network chunks. [`SseLineBuffer`] reassembles them, and [`next_chunk`]
//! reads the next body chunk while watching the generation's cancellation token.

pub mod sanitize;

pub use sanitize::Sanitizer;

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Raw response body of an upstream request
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Buffer for accumulating incomplete SSE lines across chunk boundaries.
///
/// # Example
/// ```
/// use chatbridge::streaming::SseLineBuffer;
///
/// let mut buffer = SseLineBuffer::new();
///
/// assert!(buffer.feed(b"data: {\"text\":\"hel").is_empty());
/// assert_eq!(buffer.feed(b"lo\"}\r\n"), vec!["data: {\"text\":\"hello\"}"]);
/// ```
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    incomplete: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the buffer and return every line completed by them.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped and blank separator lines
    /// are skipped. Invalid UTF-8 is replaced rather than rejected.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.incomplete.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(pos) = self.incomplete.find('\n') {
            let rest = self.incomplete.split_off(pos + 1);
            let line = std::mem::replace(&mut self.incomplete, rest);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Flush a trailing line that never received its terminator
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.incomplete);
        let line = line.trim_end_matches('\r');
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Payload of an SSE `data:` line, or `None` for comments and other fields
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Read the next body chunk, aborting promptly if the generation is cancelled.
///
/// Returns `Ok(None)` at the end of the body.
pub async fn next_chunk(
    body: &mut ByteStream,
    cancel: &CancellationToken,
) -> AppResult<Option<Bytes>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        next = body.next() => match next {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(AppError::Transport(format!("Stream interrupted: {}", e))),
            None => Ok(None),
        },
    }
}
