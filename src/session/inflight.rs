//! In-flight generation tracking
//!
//! At most one generation may commit to a given session for a given provider
//! at a time. A second concurrent request for the same pair is rejected with
//! [`AppError::SessionBusy`] instead of racing on the commit.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{AppError, AppResult};

type Key = (String, String);

/// Registry of `(session_id, provider)` pairs with a generation in flight
#[derive(Debug, Default, Clone)]
pub struct InFlightRegistry {
    active: Arc<Mutex<HashSet<Key>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Key>> {
        // Entries are plain strings; a poisoned set is still consistent.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the pair, failing if another generation already holds it
    pub fn acquire(&self, session_id: &str, provider: &str) -> AppResult<InFlightGuard> {
        let key = (session_id.to_string(), provider.to_string());

        if !self.lock().insert(key.clone()) {
            debug!(
                session_id = %session_id,
                provider = %provider,
                "Rejecting concurrent generation"
            );
            return Err(AppError::SessionBusy {
                session_id: session_id.to_string(),
                provider: provider.to_string(),
            });
        }

        Ok(InFlightGuard {
            registry: self.clone(),
            key: Some(key),
        })
    }

    pub fn is_active(&self, session_id: &str, provider: &str) -> bool {
        self.lock()
            .contains(&(session_id.to_string(), provider.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its pair when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    key: Option<Key>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.registry.lock().remove(&key);
        }
    }
}
