//! Cumulative-text sanitization
//!
//! Sanitizers run over the whole answer accumulated so far rather than over
//! each delta, so artifacts split across chunk boundaries are still removed
//! and every frame sent to the caller is consistent with the previous one.

use once_cell::sync::Lazy;
use regex::Regex;

/// Inline citation markers such as `[^1^]`
static CITATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\^\d+\^\]").expect("citation pattern is valid"));

/// An ordered set of removal rules declared by a provider adapter
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    rules: Vec<Regex>,
}

impl Sanitizer {
    /// A sanitizer that leaves text untouched
    pub fn none() -> Self {
        Self::default()
    }

    /// Strips `[^<digits>^]` reference markers
    pub fn citation_markers() -> Self {
        Self {
            rules: vec![CITATION_MARKER.clone()],
        }
    }

    /// Apply every rule until the text stops changing.
    ///
    /// Removing one marker can join its neighbours into a new one
    /// (`[^[^1^]2^]`), so a single pass would not be idempotent.
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let mut changed = false;
            for rule in &self.rules {
                let next = rule.replace_all(&current, "");
                if next != current {
                    current = next.into_owned();
                    changed = true;
                }
            }
            if !changed {
                return current;
            }
        }
    }
}
