//! Generation session
//!
//! Drives one question through an adapter: wires the cancellation trigger to
//! the caller's channel, sanitizes every cumulative chunk, forwards partial
//! answers and commits the session only when the exchange succeeds.

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::ModelMode,
    error::{AppError, AppResult},
    provider::{BoxedAdapter, GenerateRequest, StreamEvent},
    session::{ContinuityBundle, Session},
    streaming::Sanitizer,
};

use super::{
    cancel::{CancelReason, CancelTrigger},
    channel::{Channel, ChannelSessionManager, ServerFrame},
};

/// How a generation ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The session was committed and the final frame sent
    Completed { answer: String },
    /// Nothing was committed; `partial` is the sanitized answer at the time
    Cancelled { reason: CancelReason, partial: String },
}

impl GenerationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Completed { .. } => "completed",
            GenerationOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// One cancellable question/answer exchange
pub struct GenerationSession {
    adapter: BoxedAdapter,
    trigger: CancelTrigger,
    mode: ModelMode,
}

impl GenerationSession {
    pub fn new(adapter: BoxedAdapter, trigger: CancelTrigger, mode: ModelMode) -> Self {
        Self {
            adapter,
            trigger,
            mode,
        }
    }

    /// Run the exchange to a terminal state.
    ///
    /// `session` is modified only on success. Failures are reported to the
    /// caller as an error frame and returned; cancellation is not an error.
    #[instrument(
        skip_all,
        fields(provider = %self.adapter.name(), session_id = %session.session_id)
    )]
    pub async fn run(
        self,
        question: &str,
        session: &mut Session,
        channel: Channel,
    ) -> AppResult<GenerationOutcome> {
        let provider = self.adapter.name().to_string();
        let sanitizer = self.adapter.sanitizer();
        let mut manager = ChannelSessionManager::attach(channel, self.trigger.clone());

        let request = GenerateRequest {
            question: question.to_string(),
            cancel: self.trigger.token().clone(),
            mode: self.mode,
            resume: session.bundle_for(&provider).cloned(),
            history: session.conversation_records.clone(),
        };

        let mut answer = String::new();
        let result = self.drive(request, &sanitizer, &manager, &mut answer).await;

        manager.detach();
        let interrupted = self.trigger.is_cancelled() || manager.is_closed();

        match result {
            Ok(bundle) if !interrupted => {
                session.commit(&provider, bundle, question, answer.as_str());
                info!(
                    records = session.conversation_records.len(),
                    chars = answer.len(),
                    "Generation completed"
                );
                manager
                    .finish(ServerFrame::completed(answer.as_str(), session.clone()))
                    .await;
                Ok(GenerationOutcome::Completed { answer })
            }
            Err(err) if !err.is_cancelled() && !interrupted => {
                warn!(error = %err, code = err.code(), "Generation failed");
                manager.fail(&err).await;
                Err(err)
            }
            _ => Ok(self.cancelled(&mut manager, answer).await),
        }
    }

    async fn drive(
        &self,
        request: GenerateRequest,
        sanitizer: &Sanitizer,
        manager: &ChannelSessionManager,
        answer: &mut String,
    ) -> AppResult<ContinuityBundle> {
        let token = self.trigger.token().clone();

        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AppError::Cancelled),
            stream = self.adapter.generate(request) => stream?,
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(AppError::Cancelled),
                event = stream.next() => event,
            };

            match event {
                Some(Ok(StreamEvent::Progress(text))) => {
                    *answer = sanitizer.apply(&text);
                    // A caller that stops reading must not hold up cancellation
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(AppError::Cancelled),
                        _ = manager.emit(ServerFrame::partial(answer.as_str())) => {}
                    }
                }
                Some(Ok(StreamEvent::Completed(bundle))) => return Ok(bundle),
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(AppError::Transport(
                        "Stream ended before the answer completed".to_string(),
                    ))
                }
            }
        }
    }

    async fn cancelled(
        &self,
        manager: &mut ChannelSessionManager,
        partial: String,
    ) -> GenerationOutcome {
        // A stop acknowledged by the listener counts even if its trigger never ran
        self.trigger.fire(CancelReason::StopRequested);
        let reason = self.trigger.reason().unwrap_or(CancelReason::StopRequested);

        match reason {
            CancelReason::Shutdown => {
                manager.finish(ServerFrame::stopped(Some(partial.clone()))).await;
            }
            CancelReason::StopRequested | CancelReason::Disconnected => manager.close(),
        }

        debug!(reason = reason.as_str(), chars = partial.len(), "Generation cancelled");
        GenerationOutcome::Cancelled { reason, partial }
    }
}
