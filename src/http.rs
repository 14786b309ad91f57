//! Shared HTTP plumbing for the OpenAI-compatible providers.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{MemoryError, Result};

/// Client with a whole-request timeout. Requests are never retried.
pub fn build_http_client(provider: &str, timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| MemoryError::Config(format!("failed to build {provider} HTTP client: {e}")))
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Send a request and decode a JSON body, mapping every failure (transport,
/// timeout, non-2xx, malformed body) to [`MemoryError::UpstreamProvider`].
pub async fn send_json<T: DeserializeOwned>(provider: &str, request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            MemoryError::upstream(provider, "request timed out")
        } else {
            MemoryError::upstream(provider, format!("HTTP request failed: {e}"))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| MemoryError::upstream(provider, format!("failed to read response: {e}")))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(MemoryError::upstream(
            provider,
            format!("API error ({status}): {detail}"),
        ));
    }

    serde_json::from_str(&body)
        .map_err(|e| MemoryError::upstream(provider, format!("failed to parse response: {e}")))
}

/// Join a base URL and an endpoint path without doubling slashes.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
