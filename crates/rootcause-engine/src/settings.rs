//! Engine tunables resolved from configuration

use std::time::Duration;

use chrono::{DateTime, Utc};
use rootcause_config::Config;

/// Everything the engine needs from configuration, resolved once.
///
/// Tests construct this directly so timeouts can be expressed in
/// milliseconds.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on planning rounds per investigation
    pub max_iterations: u32,
    /// Wall-clock budget of a running investigation
    pub investigation_timeout: Duration,
    /// How long a suspended investigation waits for input
    pub suspension_timeout: Duration,
    /// Per-call timeout handed to the reasoning service
    pub reasoning_timeout: Duration,
    pub alert_lookback: Duration,
    pub alert_lookahead: Duration,
    /// Window used when only one end of a range is known
    pub default_query_window: Duration,
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.engine.max_iterations(),
            investigation_timeout: config.engine.investigation_timeout(),
            suspension_timeout: config.engine.suspension_timeout(),
            reasoning_timeout: config.llm.timeout(),
            alert_lookback: config.engine.alert_lookback(),
            alert_lookahead: config.engine.alert_lookahead(),
            default_query_window: config.engine.default_query_window(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::minimal_for_testing())
    }
}

/// `at + window`, saturating at the latest representable instant.
#[must_use]
pub fn offset(at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
