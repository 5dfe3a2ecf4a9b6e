//! HTTP plumbing shared by the adapters

use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{AppError, AppResult},
    streaming::ByteStream,
};

/// Send a request unless the generation is cancelled first.
///
/// Dropping the in-flight future on cancellation aborts the connection.
pub async fn send(
    builder: RequestBuilder,
    cancel: &CancellationToken,
    provider: &str,
) -> AppResult<Response> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        result = builder.send() => result.map_err(|e| {
            warn!(provider = %provider, error = %e, "Upstream request failed");
            AppError::Transport(format!("{} request failed: {}", provider, e))
        })?,
    };

    debug!(provider = %provider, status = %response.status(), "Upstream responded");
    ensure_success(response, provider).await
}

/// Map non-success statuses onto the error taxonomy
pub async fn ensure_success(response: Response, provider: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    warn!(provider = %provider, status = %status, "Upstream rejected request");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Authentication(
            format!("{} rejected credentials: {}", provider, text),
        )),
        _ => Err(AppError::Upstream {
            status: status.as_u16(),
            message: text,
        }),
    }
}

/// Body of a successful response as a pinned byte stream
pub fn body_stream(response: Response) -> ByteStream {
    Box::pin(response.bytes_stream())
}
