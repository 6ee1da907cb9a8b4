//! Shared HTTP client for HTTP-based reasoning providers
//!
//! One `reqwest::Client` per backend instance with connection reuse and a
//! bounded per-request timeout. Requests are attempted exactly once; retry
//! policy lives with the caller so attempts stay visible in investigation
//! state.

use reqwest::{Client, Response, StatusCode};
use rootcause_utils::redaction::redact_error_message;
use std::time::Duration;
use tracing::debug;

use crate::LlmError;

/// Default maximum HTTP timeout (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connect timeout (30 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Client,
    max_timeout: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, LlmError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_timeout,
        })
    }

    /// Start a POST request on the shared client.
    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    /// Execute a request once with timeout `min(request_timeout, max_timeout)`.
    ///
    /// # Errors
    ///
    /// - `LlmError::ProviderAuth` for 401/403
    /// - `LlmError::ProviderQuota` for 429
    /// - `LlmError::ProviderOutage` for 5xx
    /// - `LlmError::Timeout` when the deadline passes
    /// - `LlmError::Transport` for network errors and other 4xx
    pub async fn execute(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);

        let request = request_builder
            .timeout(effective_timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build request: {e}")))?;

        debug!(
            provider = provider_name,
            timeout_secs = effective_timeout.as_secs(),
            "Executing HTTP request"
        );

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status();
                if status.is_client_error() {
                    return Err(map_client_error(status, provider_name));
                }
                if status.is_server_error() {
                    return Err(LlmError::ProviderOutage(format!(
                        "{provider_name} returned server error: {status}"
                    )));
                }
                Ok(response)
            }
            Err(e) if e.is_timeout() => Err(LlmError::Timeout {
                duration: effective_timeout,
            }),
            Err(e) => Err(LlmError::Transport(format!(
                "{provider_name} request failed: {}",
                redact_error_message(&e.to_string())
            ))),
        }
    }
}

/// Map HTTP client error status codes to LlmError variants
fn map_client_error(status: StatusCode, provider_name: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::ProviderAuth(format!("{provider_name} authentication failed: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        _ => LlmError::Transport(format!("{provider_name} returned client error: {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_construction() {
        assert!(HttpClient::new().is_ok());
        assert!(HttpClient::with_max_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_map_401_and_403_to_provider_auth() {
        assert!(matches!(
            map_client_error(StatusCode::UNAUTHORIZED, "openai"),
            LlmError::ProviderAuth(_)
        ));
        assert!(matches!(
            map_client_error(StatusCode::FORBIDDEN, "openai"),
            LlmError::ProviderAuth(_)
        ));
    }

    #[test]
    fn test_map_429_to_provider_quota() {
        let err = map_client_error(StatusCode::TOO_MANY_REQUESTS, "anthropic");
        assert!(matches!(err, LlmError::ProviderQuota(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_map_other_4xx_to_transport() {
        let err = map_client_error(StatusCode::BAD_REQUEST, "openai");
        assert!(matches!(err, LlmError::Transport(ref m) if m.contains("400")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = HttpClient::new().unwrap();
        let request = client.post("http://127.0.0.1:9/v1/chat/completions");
        let err = client
            .execute(request, Duration::from_secs(2), "openai")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transport(_) | LlmError::Timeout { .. }));
    }
}
