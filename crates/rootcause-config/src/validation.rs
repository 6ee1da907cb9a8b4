use rootcause_utils::error::ConfigError;

use crate::model::{BackendKind, Config};

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.engine.max_iterations {
            if max == 0 {
                return Err(invalid("engine.max_iterations", "must be at least 1"));
            }
            if max > 20 {
                return Err(invalid("engine.max_iterations", "exceeds maximum limit of 20"));
            }
        }

        if let Some(secs) = self.engine.investigation_timeout_secs {
            if secs < 5 {
                return Err(invalid(
                    "engine.investigation_timeout_secs",
                    "must be at least 5 seconds",
                ));
            }
            if secs > 86_400 {
                return Err(invalid(
                    "engine.investigation_timeout_secs",
                    "exceeds maximum limit of 86400 seconds (24 hours)",
                ));
            }
        }

        if let Some(secs) = self.engine.suspension_timeout_secs {
            if secs == 0 || secs > 604_800 {
                return Err(invalid(
                    "engine.suspension_timeout_secs",
                    "must be between 1 and 604800 seconds (7 days)",
                ));
            }
        }

        if let Some(secs) = self.engine.default_query_window_secs {
            if secs == 0 {
                return Err(invalid("engine.default_query_window_secs", "must be greater than 0"));
            }
        }

        match self.llm.provider() {
            "openai" => {}
            "anthropic" => {
                if self.llm.model.is_none() {
                    return Err(ConfigError::MissingRequired("llm.model".to_string()));
                }
            }
            other => {
                return Err(invalid(
                    "llm.provider",
                    &format!("unknown provider '{other}' (expected 'openai' or 'anthropic')"),
                ));
            }
        }

        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid("llm.temperature", "must be between 0.0 and 2.0"));
            }
        }

        if self.llm.max_concurrency == Some(0) {
            return Err(invalid("llm.max_concurrency", "must be at least 1"));
        }

        if self.llm.rate_limit_min_wait() > self.llm.rate_limit_max_wait() {
            return Err(invalid(
                "llm.rate_limit_min_wait_ms",
                "must not exceed llm.rate_limit_max_wait_ms",
            ));
        }

        for kind in BackendKind::ALL {
            let section = self.backends.section(kind);
            if let Some(secs) = section.timeout_secs {
                if secs == 0 || secs > 600 {
                    return Err(invalid(
                        &format!("backends.{kind}.timeout_secs"),
                        "must be between 1 and 600 seconds",
                    ));
                }
            }
            if let Some(limit) = section.max_concurrency {
                if limit == 0 || limit > 64 {
                    return Err(invalid(
                        &format!("backends.{kind}.max_concurrency"),
                        "must be between 1 and 64",
                    ));
                }
            }
            if let Some(url) = &section.url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid(
                        &format!("backends.{kind}.url"),
                        "must start with http:// or https://",
                    ));
                }
            }
        }

        Ok(())
    }
}
