//! Conversation state
//!
//! A [`Session`] is owned by the caller and survives across requests. It holds
//! the local transcript and, per provider, the opaque continuity bundle needed
//! to resume that provider's conversation. The bridge mutates it only through
//! [`Session::commit`], at the end of a successful generation.

pub mod inflight;

pub use inflight::{InFlightGuard, InFlightRegistry};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// One completed question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub question: String,
    pub answer: String,
}

impl ConversationRecord {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Provider-specific identifiers needed to resume a conversation.
///
/// The bridge only stores and replays bundles. Each adapter defines the fields
/// of its own bundle and converts through [`ContinuityBundle::from_typed`] and
/// [`ContinuityBundle::to_typed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuityBundle(Value);

impl ContinuityBundle {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn from_typed<T: Serialize>(value: &T) -> AppResult<Self> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// Decode the bundle into the adapter's own type.
    ///
    /// A bundle that does not match is treated as a transport-class failure: the
    /// stored state was produced by a different version of the adapter.
    pub fn to_typed<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| AppError::Transport(format!("Unreadable continuity bundle: {}", e)))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Long-lived, caller-owned conversation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default = "new_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub conversation_records: Vec<ConversationRecord>,
    #[serde(default)]
    pub provider_state: BTreeMap<String, ContinuityBundle>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an empty session with a fresh id
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session_id: new_session_id(),
            conversation_records: Vec::new(),
            provider_state: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Stored continuity bundle for a provider, if an exchange has succeeded before
    pub fn bundle_for(&self, provider: &str) -> Option<&ContinuityBundle> {
        self.provider_state.get(provider)
    }

    /// Commit the result of a successful exchange.
    ///
    /// The provider's bundle is replaced wholesale and the exchange is appended
    /// to the transcript.
    pub fn commit(
        &mut self,
        provider: &str,
        bundle: ContinuityBundle,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) {
        self.provider_state.insert(provider.to_string(), bundle);
        self.conversation_records
            .push(ConversationRecord::new(question, answer));
        self.updated_at = Utc::now();
    }
}
