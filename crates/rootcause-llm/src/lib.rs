//! Reasoning service abstraction for rootcause
//!
//! Every reasoning stage talks to a `ReasoningService`. Concrete backends
//! speak either the OpenAI-compatible chat completions protocol or the
//! Anthropic Messages API; `construct_service` picks one from config and
//! wraps it in a `RateLimitedService`.

mod anthropic_backend;
pub(crate) mod http_client;
mod openai_backend;
mod rate_limited;
mod types;

pub use rate_limited::RateLimitedService;
pub use rootcause_utils::error::LlmError;
pub use types::{Completion, Message, ReasoningRequest, ReasoningService, Role};

pub(crate) use anthropic_backend::AnthropicBackend;
pub(crate) use openai_backend::OpenAiBackend;

use std::sync::Arc;

use rootcause_config::Config;
use tracing::info;

/// Construct the configured reasoning service.
///
/// # Errors
///
/// Returns `LlmError::Unsupported` if the provider is unknown.
/// Returns `LlmError::Misconfiguration` if provider-specific configuration is invalid.
pub fn construct_service(config: &Config) -> Result<Arc<dyn ReasoningService>, LlmError> {
    let provider = config.llm.provider();
    let inner: Arc<dyn ReasoningService> = match provider {
        "openai" => Arc::new(OpenAiBackend::new_from_config(config)?),
        "anthropic" => Arc::new(AnthropicBackend::new_from_config(config)?),
        other => {
            return Err(LlmError::Unsupported(format!(
                "Unknown llm.provider '{other}' (expected 'openai' or 'anthropic')"
            )));
        }
    };

    info!(provider, "Reasoning service ready");
    Ok(Arc::new(RateLimitedService::from_config(inner, config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_without_key_constructs() {
        let config = Config::minimal_for_testing();
        assert!(construct_service(&config).is_ok());
    }

    #[test]
    fn test_unknown_provider_is_unsupported() {
        let mut config = Config::minimal_for_testing();
        config.llm.provider = Some("carrier-pigeon".into());
        let err = construct_service(&config).err().unwrap();
        assert!(matches!(err, LlmError::Unsupported(_)));
    }

    #[test]
    fn test_anthropic_requires_model() {
        let mut config = Config::minimal_for_testing();
        config.llm.provider = Some("anthropic".into());
        config.llm.api_key_env = Some("PATH".into());
        config.llm.model = None;
        let err = construct_service(&config).err().unwrap();
        assert!(matches!(err, LlmError::Misconfiguration(_)));
    }
}
