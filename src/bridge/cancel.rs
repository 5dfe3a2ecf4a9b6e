//! One-shot cancellation trigger

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a generation was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller sent `{stop: true}`
    StopRequested,
    /// The caller's channel went away
    Disconnected,
    /// The server is shutting down
    Shutdown,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::StopRequested => "stop",
            CancelReason::Disconnected => "disconnect",
            CancelReason::Shutdown => "shutdown",
        }
    }
}

/// Cancellation token that records the first reason it fired for.
///
/// Only the first [`fire`](Self::fire) cancels; later calls are no-ops. The
/// token is a child of the bridge's shutdown token, so shutdown cancels it
/// without going through `fire`.
#[derive(Debug, Clone)]
pub struct CancelTrigger {
    token: CancellationToken,
    reason: Arc<OnceCell<CancelReason>>,
}

impl CancelTrigger {
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    pub fn child_of(parent: &CancellationToken) -> Self {
        Self::from_token(parent.child_token())
    }

    fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(OnceCell::new()),
        }
    }

    /// Cancel for `reason` unless already cancelled. Returns whether this call fired.
    pub fn fire(&self, reason: CancelReason) -> bool {
        if self.token.is_cancelled() {
            let _ = self.reason.set(CancelReason::Shutdown);
        }
        if self.reason.set(reason).is_err() {
            return false;
        }
        debug!(reason = reason.as_str(), "Cancelling generation");
        self.token.cancel();
        true
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason for cancellation, if cancelled
    pub fn reason(&self) -> Option<CancelReason> {
        match self.reason.get() {
            Some(reason) => Some(*reason),
            None if self.token.is_cancelled() => Some(CancelReason::Shutdown),
            None => None,
        }
    }
}

impl Default for CancelTrigger {
    fn default() -> Self {
        Self::new()
    }
}
