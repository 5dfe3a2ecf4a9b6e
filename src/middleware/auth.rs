//! Caller credentials
//!
//! The bridge does not validate credentials itself. It picks the caller's
//! access token out of the request and hands it to the adapter untouched.
//! Tokens never reach the logs; a short fingerprint is logged instead.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Extract the Authorization header and return the bearer token
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Short SHA-256 fingerprint of a token, safe to log
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(12);
    hash
}

/// Caller's access token: the bearer header wins over the `access_token` query parameter
pub fn caller_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .or_else(|| query_token.filter(|t| !t.is_empty()))
        .map(str::to_string);

    match &token {
        Some(token) => debug!(token = %fingerprint(token), "Caller supplied access token"),
        None => debug!("No caller access token"),
    }
    token
}
