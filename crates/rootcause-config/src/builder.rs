use std::path::PathBuf;
use std::time::Duration;

use rootcause_utils::error::ConfigError;

use crate::model::{BackendKind, Config};
use crate::sources::ConfigSource;

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust
    /// use rootcause_config::{BackendKind, Config};
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .max_iterations(2)
    ///     .investigation_timeout(Duration::from_secs(60))
    ///     .backend_url(BackendKind::Metrics, "http://prometheus:9090")
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.engine.max_iterations(), 2);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration of rootcause.
///
/// All values set via the builder are attributed to
/// [`ConfigSource::Programmatic`]. `build()` runs the same validation as
/// file discovery.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
    touched: Vec<String>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(mut self, key: impl Into<String>) -> Self {
        self.touched.push(key.into());
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, max: u32) -> Self {
        self.config.engine.max_iterations = Some(max);
        self.touch("engine.max_iterations")
    }

    #[must_use]
    pub fn investigation_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.investigation_timeout_secs = Some(timeout.as_secs());
        self.touch("engine.investigation_timeout_secs")
    }

    #[must_use]
    pub fn suspension_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.suspension_timeout_secs = Some(timeout.as_secs());
        self.touch("engine.suspension_timeout_secs")
    }

    #[must_use]
    pub fn llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.config.llm.provider = Some(provider.into());
        self.touch("llm.provider")
    }

    #[must_use]
    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = Some(model.into());
        self.touch("llm.model")
    }

    #[must_use]
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llm.base_url = Some(url.into());
        self.touch("llm.base_url")
    }

    #[must_use]
    pub fn llm_timeout(mut self, timeout: Duration) -> Self {
        self.config.llm.timeout_secs = Some(timeout.as_secs());
        self.touch("llm.timeout_secs")
    }

    #[must_use]
    pub fn backend_url(mut self, kind: BackendKind, url: impl Into<String>) -> Self {
        self.config.backends.section_mut(kind).url = Some(url.into());
        self.touch(format!("backends.{kind}.url"))
    }

    #[must_use]
    pub fn backend_enabled(mut self, kind: BackendKind, enabled: bool) -> Self {
        self.config.backends.section_mut(kind).enabled = Some(enabled);
        self.touch(format!("backends.{kind}.enabled"))
    }

    #[must_use]
    pub fn backend_timeout(mut self, kind: BackendKind, timeout: Duration) -> Self {
        self.config.backends.section_mut(kind).timeout_secs = Some(timeout.as_secs());
        self.touch(format!("backends.{kind}.timeout_secs"))
    }

    #[must_use]
    pub fn state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store.state_dir = Some(path.into());
        self.touch("store.state_dir")
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = self.config;
        for key in self.touched {
            config
                .source_attribution
                .insert(key, ConfigSource::Programmatic);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_attributes_programmatic_values() {
        let config = Config::builder()
            .max_iterations(2)
            .backend_enabled(BackendKind::Dashboard, false)
            .build()
            .unwrap();
        assert_eq!(config.engine.max_iterations(), 2);
        assert!(!config.backends.resolve(BackendKind::Dashboard).enabled);
        assert_eq!(
            config.source_attribution.get("engine.max_iterations"),
            Some(&ConfigSource::Programmatic)
        );
        let effective = config.effective_config();
        assert_eq!(
            effective.get("engine.max_iterations"),
            Some(&("2".to_string(), "programmatic".to_string()))
        );
    }

    #[test]
    fn builder_validates() {
        assert!(Config::builder().max_iterations(0).build().is_err());
    }
}
