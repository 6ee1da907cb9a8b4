//! OpenAI-compatible chat completions backend
//!
//! Works against any server exposing `POST /v1/chat/completions` (vLLM,
//! llama.cpp server, OpenAI itself). An API key is optional so local
//! inference servers need no credentials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rootcause_config::{Config, DEFAULT_LLM_MODEL, DEFAULT_OPENAI_BASE_URL};

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::types::{Completion, Message, ReasoningRequest, ReasoningService};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl HttpParams {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            max_tokens: config.llm.max_tokens(),
            temperature: config.llm.temperature(),
        }
    }

    /// Apply `max_tokens` / `temperature` overrides carried in request metadata
    pub(crate) fn resolve(self, request: &ReasoningRequest) -> Self {
        Self {
            max_tokens: request
                .metadata
                .get("max_tokens")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(self.max_tokens),
            temperature: request
                .metadata
                .get("temperature")
                .and_then(serde_json::Value::as_f64)
                .map(|v| v as f32)
                .unwrap_or(self.temperature),
        }
    }
}

#[derive(Clone)]
pub(crate) struct OpenAiBackend {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    default_params: HttpParams,
}

impl OpenAiBackend {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` when `llm.api_key_env` names a
    /// variable that is not set.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key = match config.llm.api_key_env.as_deref() {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                LlmError::Misconfiguration(format!(
                    "API key not found in environment variable '{var}' (llm.api_key_env)"
                ))
            })?),
            None => None,
        };

        Self::new(
            api_key,
            config.llm.base_url.clone(),
            config
                .llm
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            HttpParams::from_config(config),
        )
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|msg| ChatMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ReasoningService for OpenAiBackend {
    async fn complete(&self, request: ReasoningRequest) -> Result<Completion, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };
        let params = self.default_params.resolve(&request);

        debug!(
            provider = "openai",
            model = %model,
            stage = %request.stage,
            investigation_id = %request.investigation_id,
            timeout_secs = request.timeout.as_secs(),
            "Invoking chat completions backend"
        );

        let body = ChatRequest {
            model: model.clone(),
            messages: Self::convert_messages(&request.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let mut builder = self
            .client
            .post(&self.base_url)
            .header("content-type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = self.client.execute(builder, request.timeout, "openai").await?;
        let response_body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse chat response: {e}")))?;

        let content = response_body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                LlmError::Transport("chat response missing choices[0].message.content".to_string())
            })?;

        let mut completion = Completion::new(content, "openai", model);
        if let Some(usage) = response_body.usage {
            completion.tokens_input = Some(usage.prompt_tokens);
            completion.tokens_output = Some(usage.completion_tokens);
        }

        debug!(
            provider = "openai",
            tokens_input = ?completion.tokens_input,
            tokens_output = ?completion.tokens_output,
            "Chat completion finished"
        );

        Ok(completion)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
