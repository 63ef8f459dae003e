//! Shared plumbing for the HTTP-backed clients

use crate::error::{CloverError, Result};
use reqwest::{Client, Response};
use std::time::Duration;

/// User agent sent with every request
pub(crate) const USER_AGENT: &str = concat!("clover/", env!("CARGO_PKG_VERSION"));

/// Build a `reqwest` client with the given whole-request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CloverError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Pass a successful response through, or turn a failed one into an error
///
/// The body of a failed response is read (best-effort) and handed to
/// [`CloverError::from_status`] so it can be surfaced verbatim.
pub(crate) async fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    tracing::error!("Request for {} failed with {}: {}", subject, status, body);
    Err(CloverError::from_status(status, &body, subject))
}

/// Read the whole body of a response as text
pub(crate) async fn read_text(response: Response) -> Result<String> {
    response.text().await.map_err(CloverError::from_transport)
}
