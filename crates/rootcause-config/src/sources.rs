use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{BackendKind, Config};

/// Where a resolved configuration value came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    Config,
    /// Value provided programmatically (e.g., `Config::builder()`).
    Programmatic,
    /// Built-in default value (lowest precedence).
    Default,
}

impl ConfigSource {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Config => "config",
            Self::Programmatic => "programmatic",
            Self::Default => "default",
        }
    }
}

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut out = BTreeMap::new();
        let mut add = |key: &str, value: String| {
            let source = self
                .source_attribution
                .get(key)
                .copied()
                .unwrap_or(ConfigSource::Default);
            out.insert(key.to_string(), (value, source.label().to_string()));
        };

        add("engine.max_iterations", self.engine.max_iterations().to_string());
        add(
            "engine.investigation_timeout_secs",
            self.engine.investigation_timeout().as_secs().to_string(),
        );
        add(
            "engine.suspension_timeout_secs",
            self.engine.suspension_timeout().as_secs().to_string(),
        );
        add("llm.provider", self.llm.provider().to_string());
        if let Some(model) = &self.llm.model {
            add("llm.model", model.clone());
        }
        add("llm.timeout_secs", self.llm.timeout().as_secs().to_string());
        for kind in BackendKind::ALL {
            let resolved = self.backends.resolve(kind);
            add(&format!("backends.{kind}.url"), resolved.url);
            add(&format!("backends.{kind}.enabled"), resolved.enabled.to_string());
        }
        if let Some(dir) = &self.store.state_dir {
            add("store.state_dir", dir.display().to_string());
        }
        out
    }
}
