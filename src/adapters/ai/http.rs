//! HTTP plumbing shared by the remote provider adapters.

use reqwest::{Client, Response};
use std::time::Duration;

use crate::ports::ProviderError;

/// Seconds to wait when a 429 carries no usable hint.
pub const DEFAULT_RETRY_AFTER_SECS: u32 = 30;

/// Builds a client with a request timeout.
///
/// Falls back to a default client if the builder rejects the settings; the
/// engine enforces its own deadline around every call either way.
pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Maps a transport failure to a provider error.
pub fn map_send_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(timeout)
    } else if err.is_connect() {
        ProviderError::network(format!("Connection failed: {}", err))
    } else {
        ProviderError::network(err.to_string())
    }
}

/// Passes successful responses through and classifies the rest.
pub async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let header_hint = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u32>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(classify_status(status.as_u16(), header_hint, &body))
}

/// Status-code classification, split out for testing.
pub fn classify_status(status: u16, retry_after: Option<u32>, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationFailed,
        429 => ProviderError::rate_limited(
            retry_after
                .or_else(|| parse_retry_hint(body))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        ),
        400 | 404 | 413 | 422 => ProviderError::InvalidRequest(body.to_string()),
        408 => ProviderError::network(format!("Request timeout {}: {}", status, body)),
        500..=599 => ProviderError::unavailable(format!("Server error {}: {}", status, body)),
        _ => ProviderError::network(format!("Unexpected status {}: {}", status, body)),
    }
}

/// Finds a "try again in Ns" hint in an error body.
fn parse_retry_hint(body: &str) -> Option<u32> {
    let idx = body.find("try again in ")?;
    let rest = &body[idx + "try again in ".len()..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse::<u32>().ok()
}
