//! HTTP plumbing shared by the backend clients
//!
//! Each backend owns one `reqwest::Client`; every call is a single GET with
//! the backend's configured timeout. Status and transport failures map onto
//! `ToolError` so the engine can tell transient from permanent failures.

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use rootcause_config::{BackendKind, ResolvedBackend};
use rootcause_utils::redaction::redact_error_message;

use crate::ToolError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body excerpt carried into `ToolError::Http`
const MAX_ERROR_BODY: usize = 300;

#[derive(Clone)]
pub(crate) struct BackendHttp {
    client: Client,
    base_url: String,
    kind: BackendKind,
    timeout: Duration,
    bearer: Option<String>,
}

impl BackendHttp {
    /// # Errors
    ///
    /// Returns `ToolError::Transport` if the base URL is unusable or the
    /// client cannot be built.
    pub fn new(backend: &ResolvedBackend) -> Result<Self, ToolError> {
        Url::parse(&backend.url).map_err(|e| ToolError::Transport {
            backend: backend.kind.to_string(),
            message: format!("invalid url '{}': {e}", backend.url),
        })?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(backend.timeout))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ToolError::Transport {
                backend: backend.kind.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        // A missing token env var is not fatal; anonymous access may be allowed.
        let bearer = backend
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty());

        Ok(Self {
            client,
            base_url: backend.url.trim_end_matches('/').to_string(),
            kind: backend.kind,
            timeout: backend.timeout,
            bearer,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Build `base_url + path` with encoded query parameters.
    pub fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, ToolError> {
        Url::parse_with_params(&format!("{}{path}", self.base_url), params).map_err(|e| {
            ToolError::Transport {
                backend: self.kind.to_string(),
                message: format!("invalid request url: {e}"),
            }
        })
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ToolError> {
        let url = self.url(path, params)?;
        let backend = self.kind.to_string();

        debug!(
            backend = %backend,
            path,
            timeout_secs = self.timeout.as_secs(),
            "Querying backend"
        );

        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(ToolError::Timeout {
                    backend,
                    duration: self.timeout,
                });
            }
            Err(e) => {
                return Err(ToolError::Transport {
                    backend,
                    message: redact_error_message(&e.to_string()),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_error(&backend, status, &body));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    backend: backend.clone(),
                    duration: self.timeout,
                }
            } else {
                ToolError::Decode {
                    backend: backend.clone(),
                    message: e.to_string(),
                }
            }
        })
    }
}

fn http_error(backend: &str, status: StatusCode, body: &str) -> ToolError {
    let mut message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("no body").to_string();
    }
    ToolError::Http {
        backend: backend.to_string(),
        status: status.as_u16(),
        message: redact_error_message(&message),
    }
}
