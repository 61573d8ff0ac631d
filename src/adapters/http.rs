//! Shared reqwest plumbing for the API adapters.

use crate::utils::error::{PrepError, Result};
use reqwest::{Client, Response};
use std::time::Duration;

pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?)
}

/// Passes 2xx responses through; anything else becomes an
/// [`PrepError::UpstreamError`] carrying the response body.
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    tracing::debug!("Upstream {} returned {}", status, message);
    Err(PrepError::UpstreamError {
        status: status.as_u16(),
        message,
    })
}
