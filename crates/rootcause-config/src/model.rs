use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::sources::ConfigSource;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_INVESTIGATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SUSPENSION_TIMEOUT_SECS: u64 = 900;
/// Alert window opens this long before the alert fired (15 minutes)
pub const DEFAULT_ALERT_LOOKBACK_SECS: u64 = 900;
/// Alert window closes this long after the alert fired (5 minutes)
pub const DEFAULT_ALERT_LOOKAHEAD_SECS: u64 = 300;
pub const DEFAULT_QUERY_WINDOW_SECS: u64 = 3600;

pub const DEFAULT_LLM_PROVIDER: &str = "openai";
pub const DEFAULT_OPENAI_BASE_URL: &str = "http://localhost:8000/v1/chat/completions";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_LLM_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_RATE_LIMIT_RETRIES: u32 = 3;
pub const DEFAULT_RATE_LIMIT_MIN_WAIT_MS: u64 = 5_000;
pub const DEFAULT_RATE_LIMIT_MAX_WAIT_MS: u64 = 120_000;

pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BACKEND_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_DASHBOARD_API_KEY_ENV: &str = "GRAFANA_API_KEY";

/// The three kinds of read-only query backend an investigation can consult.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Time-series metrics (Prometheus HTTP API)
    Metrics,
    /// Log lines (Loki HTTP API)
    Logs,
    /// Dashboards and annotations (Grafana HTTP API)
    Dashboard,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Metrics, Self::Logs, Self::Dashboard];

    #[must_use]
    pub fn default_url(self) -> &'static str {
        match self {
            Self::Metrics => "http://localhost:9090",
            Self::Logs => "http://localhost:3100",
            Self::Dashboard => "http://localhost:3000",
        }
    }
}

/// Configuration for rootcause.
///
/// `Config` provides hierarchical configuration with discovery and precedence:
/// CLI arguments > config file > built-in defaults.
///
/// Sections keep every key optional so a file can set only what it needs;
/// the accessor methods apply the built-in defaults. Use
/// [`Config::discover`] for CLI semantics or [`Config::builder`] when
/// embedding.
///
/// # Example
///
/// ```rust,no_run
/// use rootcause_config::{CliArgs, Config};
///
/// let config = Config::discover(&CliArgs::default())?;
/// println!("max iterations: {}", config.engine.max_iterations());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub llm: LlmConfig,
    pub backends: BackendsConfig,
    pub store: StoreConfig,
    /// Where each resolved key came from, keyed by dotted path (`engine.max_iterations`)
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// Deterministic configuration with built-in defaults and no discovery.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Config::default()
    }
}

/// `[engine]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub max_iterations: Option<u32>,
    pub investigation_timeout_secs: Option<u64>,
    pub suspension_timeout_secs: Option<u64>,
    pub alert_lookback_secs: Option<u64>,
    pub alert_lookahead_secs: Option<u64>,
    pub default_query_window_secs: Option<u64>,
}

impl EngineConfig {
    #[must_use]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    #[must_use]
    pub fn investigation_timeout(&self) -> Duration {
        Duration::from_secs(
            self.investigation_timeout_secs
                .unwrap_or(DEFAULT_INVESTIGATION_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn suspension_timeout(&self) -> Duration {
        Duration::from_secs(
            self.suspension_timeout_secs
                .unwrap_or(DEFAULT_SUSPENSION_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn alert_lookback(&self) -> Duration {
        Duration::from_secs(self.alert_lookback_secs.unwrap_or(DEFAULT_ALERT_LOOKBACK_SECS))
    }

    #[must_use]
    pub fn alert_lookahead(&self) -> Duration {
        Duration::from_secs(
            self.alert_lookahead_secs
                .unwrap_or(DEFAULT_ALERT_LOOKAHEAD_SECS),
        )
    }

    #[must_use]
    pub fn default_query_window(&self) -> Duration {
        Duration::from_secs(
            self.default_query_window_secs
                .unwrap_or(DEFAULT_QUERY_WINDOW_SECS),
        )
    }
}

/// `[llm]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// `openai` (any OpenAI-compatible chat completions endpoint) or `anthropic`
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_concurrency: Option<usize>,
    pub rate_limit_retries: Option<u32>,
    pub rate_limit_min_wait_ms: Option<u64>,
    pub rate_limit_max_wait_ms: Option<u64>,
}

impl LlmConfig {
    #[must_use]
    pub fn provider(&self) -> &str {
        self.provider.as_deref().unwrap_or(DEFAULT_LLM_PROVIDER)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_LLM_MAX_TOKENS)
    }

    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.0)
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(DEFAULT_LLM_MAX_CONCURRENCY)
    }

    #[must_use]
    pub fn rate_limit_retries(&self) -> u32 {
        self.rate_limit_retries.unwrap_or(DEFAULT_RATE_LIMIT_RETRIES)
    }

    #[must_use]
    pub fn rate_limit_min_wait(&self) -> Duration {
        Duration::from_millis(
            self.rate_limit_min_wait_ms
                .unwrap_or(DEFAULT_RATE_LIMIT_MIN_WAIT_MS),
        )
    }

    #[must_use]
    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_millis(
            self.rate_limit_max_wait_ms
                .unwrap_or(DEFAULT_RATE_LIMIT_MAX_WAIT_MS),
        )
    }
}

/// One `[backends.<kind>]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    /// Environment variable holding a bearer token (dashboard backend)
    pub api_key_env: Option<String>,
}

/// `[backends]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendsConfig {
    #[serde(default)]
    pub metrics: BackendConfig,
    #[serde(default)]
    pub logs: BackendConfig,
    #[serde(default)]
    pub dashboard: BackendConfig,
}

/// A backend section with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub kind: BackendKind,
    pub enabled: bool,
    pub url: String,
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub api_key_env: Option<String>,
}

impl BackendsConfig {
    #[must_use]
    pub fn section(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::Metrics => &self.metrics,
            BackendKind::Logs => &self.logs,
            BackendKind::Dashboard => &self.dashboard,
        }
    }

    pub(crate) fn section_mut(&mut self, kind: BackendKind) -> &mut BackendConfig {
        match kind {
            BackendKind::Metrics => &mut self.metrics,
            BackendKind::Logs => &mut self.logs,
            BackendKind::Dashboard => &mut self.dashboard,
        }
    }

    /// Resolve one backend section against the built-in defaults.
    #[must_use]
    pub fn resolve(&self, kind: BackendKind) -> ResolvedBackend {
        let section = self.section(kind);
        let api_key_env = match kind {
            BackendKind::Dashboard => Some(
                section
                    .api_key_env
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DASHBOARD_API_KEY_ENV.to_string()),
            ),
            _ => section.api_key_env.clone(),
        };
        ResolvedBackend {
            kind,
            enabled: section.enabled.unwrap_or(true),
            url: section
                .url
                .clone()
                .unwrap_or_else(|| kind.default_url().to_string()),
            timeout: Duration::from_secs(
                section.timeout_secs.unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS),
            ),
            max_concurrency: section
                .max_concurrency
                .unwrap_or(DEFAULT_BACKEND_MAX_CONCURRENCY),
            api_key_env,
        }
    }
}

/// `[store]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory for durable investigation records; in-memory only when unset
    pub state_dir: Option<PathBuf>,
}
