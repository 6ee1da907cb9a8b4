//! Anthropic Messages API backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rootcause_config::{Config, DEFAULT_ANTHROPIC_BASE_URL};

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::openai_backend::HttpParams;
use crate::types::{Completion, Message, ReasoningRequest, ReasoningService, Role};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Clone)]
pub(crate) struct AnthropicBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl AnthropicBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key variable is unset
    /// or no model is configured.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key_env = config
            .llm
            .api_key_env
            .as_deref()
            .unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{api_key_env}'"
            ))
        })?;
        let default_model = config.llm.model.clone().ok_or_else(|| {
            LlmError::Misconfiguration("llm.model must be set for the anthropic provider".into())
        })?;

        Ok(Self {
            client: HttpClient::new()?,
            base_url: config
                .llm
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params: HttpParams::from_config(config),
        })
    }

    /// Split out system messages; Anthropic takes them as a top-level field.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_parts = Vec::new();
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.clone()),
                Role::User | Role::Assistant => converted.push(AnthropicMessage {
                    role: msg.role.as_str().to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, converted)
    }
}

#[async_trait]
impl ReasoningService for AnthropicBackend {
    async fn complete(&self, request: ReasoningRequest) -> Result<Completion, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };
        let params = self.default_params.resolve(&request);

        debug!(
            provider = "anthropic",
            model = %model,
            stage = %request.stage,
            investigation_id = %request.investigation_id,
            "Invoking Anthropic backend"
        );

        let (system, messages) = Self::convert_messages(&request.messages);
        let body = AnthropicRequest {
            model: model.clone(),
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system,
        };

        let builder = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .client
            .execute(builder, request.timeout, "anthropic")
            .await?;
        let response_body: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let content: String = response_body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(LlmError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }

        let mut completion = Completion::new(content, "anthropic", model);
        if let Some(usage) = response_body.usage {
            completion.tokens_input = Some(usage.input_tokens);
            completion.tokens_output = Some(usage.output_tokens);
        }
        Ok(completion)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_lifted() {
        let (system, messages) = AnthropicBackend::convert_messages(&[
            Message::system("You are an SRE."),
            Message::system("Answer in JSON."),
            Message::user("plan"),
        ]);
        assert_eq!(system.as_deref(), Some("You are an SRE.\n\nAnswer in JSON."));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn request_omits_empty_system() {
        let body = AnthropicRequest {
            model: "m".into(),
            messages: vec![],
            max_tokens: 10,
            temperature: 0.0,
            system: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn parses_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"INSUFFICIENT"},{"type":"tool_use","id":"x"}],
                       "usage":{"input_tokens":5,"output_tokens":2}}"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.content.len(), 2);
        assert_eq!(parsed.content[0].text.as_deref(), Some("INSUFFICIENT"));
        assert!(parsed.content[1].text.is_none());
    }
}
