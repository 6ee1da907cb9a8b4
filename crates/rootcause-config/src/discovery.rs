use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use rootcause_utils::error::ConfigError;

use crate::cli_args::CliArgs;
use crate::model::{BackendsConfig, Config, EngineConfig, LlmConfig, StoreConfig};
use crate::sources::ConfigSource;

/// Directory searched for `config.toml` during discovery
pub const CONFIG_DIR_NAME: &str = ".rootcause";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    engine: Option<EngineConfig>,
    llm: Option<LlmConfig>,
    backends: Option<BackendsConfig>,
    store: Option<StoreConfig>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot read current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "Loading configuration file");
            let content = std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidFile(format!("cannot read {}: {e}", path.display()))
            })?;
            config.apply_file(&content)?;
        }

        config.apply_cli(cli_args);
        config.validate()?;
        Ok(config)
    }

    /// Search upward from `start_dir` for `.rootcause/config.toml`.
    ///
    /// The search stops at the filesystem root or at a repository root
    /// (`.git`, `.hg`, `.svn`).
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_DIR_NAME).join("config.toml");
            if candidate.exists() {
                return Some(candidate);
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists() {
                break;
            }
            current = dir.parent();
        }

        None
    }

    /// Merge a TOML document over the current values.
    ///
    /// Every key present in the document is attributed to
    /// [`ConfigSource::Config`].
    pub fn apply_file(&mut self, content: &str) -> Result<(), ConfigError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        let file: TomlConfig = table
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidFile(e.to_string()))?;

        let mut keys = Vec::new();
        collect_keys("", &table, &mut keys);

        if let Some(engine) = file.engine {
            merge_engine(&mut self.engine, engine);
        }
        if let Some(llm) = file.llm {
            merge_llm(&mut self.llm, llm);
        }
        if let Some(backends) = file.backends {
            for kind in crate::model::BackendKind::ALL {
                let from = backends.section(kind).clone();
                let into = self.backends.section_mut(kind);
                into.enabled = from.enabled.or(into.enabled);
                into.url = from.url.or(into.url.take());
                into.timeout_secs = from.timeout_secs.or(into.timeout_secs);
                into.max_concurrency = from.max_concurrency.or(into.max_concurrency);
                into.api_key_env = from.api_key_env.or(into.api_key_env.take());
            }
        }
        if let Some(store) = file.store {
            self.store.state_dir = store.state_dir.or(self.store.state_dir.take());
        }

        attribute(&mut self.source_attribution, keys, ConfigSource::Config);
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        let mut keys = Vec::new();
        if let Some(dir) = &cli.state_dir {
            self.store.state_dir = Some(dir.clone());
            keys.push("store.state_dir".to_string());
        }
        if let Some(max) = cli.max_iterations {
            self.engine.max_iterations = Some(max);
            keys.push("engine.max_iterations".to_string());
        }
        if let Some(secs) = cli.investigation_timeout_secs {
            self.engine.investigation_timeout_secs = Some(secs);
            keys.push("engine.investigation_timeout_secs".to_string());
        }
        if let Some(provider) = &cli.llm_provider {
            self.llm.provider = Some(provider.clone());
            keys.push("llm.provider".to_string());
        }
        if let Some(model) = &cli.llm_model {
            self.llm.model = Some(model.clone());
            keys.push("llm.model".to_string());
        }
        attribute(&mut self.source_attribution, keys, ConfigSource::Cli);
    }
}

fn collect_keys(prefix: &str, table: &toml::Table, out: &mut Vec<String>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => collect_keys(&path, inner, out),
            _ => out.push(path),
        }
    }
}

fn attribute(map: &mut HashMap<String, ConfigSource>, keys: Vec<String>, source: ConfigSource) {
    for key in keys {
        map.insert(key, source);
    }
}

fn merge_engine(into: &mut EngineConfig, from: EngineConfig) {
    into.max_iterations = from.max_iterations.or(into.max_iterations);
    into.investigation_timeout_secs = from
        .investigation_timeout_secs
        .or(into.investigation_timeout_secs);
    into.suspension_timeout_secs = from.suspension_timeout_secs.or(into.suspension_timeout_secs);
    into.alert_lookback_secs = from.alert_lookback_secs.or(into.alert_lookback_secs);
    into.alert_lookahead_secs = from.alert_lookahead_secs.or(into.alert_lookahead_secs);
    into.default_query_window_secs = from
        .default_query_window_secs
        .or(into.default_query_window_secs);
}

fn merge_llm(into: &mut LlmConfig, from: LlmConfig) {
    into.provider = from.provider.or(into.provider.take());
    into.base_url = from.base_url.or(into.base_url.take());
    into.model = from.model.or(into.model.take());
    into.api_key_env = from.api_key_env.or(into.api_key_env.take());
    into.timeout_secs = from.timeout_secs.or(into.timeout_secs);
    into.max_tokens = from.max_tokens.or(into.max_tokens);
    into.temperature = from.temperature.or(into.temperature);
    into.max_concurrency = from.max_concurrency.or(into.max_concurrency);
    into.rate_limit_retries = from.rate_limit_retries.or(into.rate_limit_retries);
    into.rate_limit_min_wait_ms = from.rate_limit_min_wait_ms.or(into.rate_limit_min_wait_ms);
    into.rate_limit_max_wait_ms = from.rate_limit_max_wait_ms.or(into.rate_limit_max_wait_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackendKind;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_when_no_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
        assert_eq!(config.engine.max_iterations(), 5);
        assert!(config.source_attribution.is_empty());
    }

    #[test]
    fn discovers_file_upward_and_attributes_keys() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            r#"
[engine]
max_iterations = 3

[backends.logs]
url = "http://loki.internal:3100"
timeout_secs = 10
"#,
        );
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();
        assert_eq!(config.engine.max_iterations(), 3);
        let logs = config.backends.resolve(BackendKind::Logs);
        assert_eq!(logs.url, "http://loki.internal:3100");
        assert_eq!(logs.timeout, Duration::from_secs(10));
        assert_eq!(
            config.source_attribution.get("backends.logs.url"),
            Some(&ConfigSource::Config)
        );
    }

    #[test]
    fn cli_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "[engine]\nmax_iterations = 3\n");

        let cli = CliArgs {
            config_path: Some(path),
            max_iterations: Some(7),
            ..CliArgs::default()
        };
        let config = Config::discover_from(temp.path(), &cli).unwrap();
        assert_eq!(config.engine.max_iterations(), 7);
        assert_eq!(
            config.source_attribution.get("engine.max_iterations"),
            Some(&ConfigSource::Cli)
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "[engine]\nmax_iteration = 3\n");
        let cli = CliArgs {
            config_path: Some(path),
            ..CliArgs::default()
        };
        let err = Config::discover_from(temp.path(), &cli).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile(_)));
    }

    #[test]
    fn missing_explicit_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(temp.path().join("nope.toml")),
            ..CliArgs::default()
        };
        let err = Config::discover_from(temp.path(), &cli).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "[engine]\nmax_iterations = 0\n");
        let cli = CliArgs {
            config_path: Some(path),
            ..CliArgs::default()
        };
        let err = Config::discover_from(temp.path(), &cli).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "engine.max_iterations")
        );
    }
}
