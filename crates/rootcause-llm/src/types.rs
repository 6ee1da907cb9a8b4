use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::LlmError;

/// Role of a message in a reasoning conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a reasoning conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// One call to the reasoning service.
///
/// `stage` names the workflow stage issuing the call; backends only use it
/// for logging, while test doubles route scripted answers by it.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub investigation_id: String,
    pub stage: String,
    /// Model override; empty means the backend default
    pub model: String,
    pub timeout: Duration,
    pub messages: Vec<Message>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ReasoningRequest {
    pub fn new(
        investigation_id: impl Into<String>,
        stage: impl Into<String>,
        timeout: Duration,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            investigation_id: investigation_id.into(),
            stage: stage.into(),
            model: String::new(),
            timeout,
            messages,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenated content of every user message
    #[must_use]
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text returned by the reasoning service plus accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl Completion {
    pub fn new(
        text: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }
}

/// Opaque text-completion capability used by every reasoning stage.
///
/// Implementations are stateless per call and must honor
/// `request.timeout`; they never retry on their own except for provider
/// rate limiting (see `RateLimitedService`).
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, request: ReasoningRequest) -> Result<Completion, LlmError>;
}

#[async_trait]
impl<T: ReasoningService + ?Sized> ReasoningService for Arc<T> {
    async fn complete(&self, request: ReasoningRequest) -> Result<Completion, LlmError> {
        (**self).complete(request).await
    }
}
