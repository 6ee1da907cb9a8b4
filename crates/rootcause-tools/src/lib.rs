//! Tool gateway for rootcause
//!
//! Uniform, read-only access to the metrics (Prometheus), log (Loki) and
//! dashboard (Grafana) backends. Calls are single-attempt and bounded by
//! the backend's timeout; `ConcurrencyLimitedGateway` caps in-flight calls
//! per backend.

mod gateway;
mod grafana;
pub(crate) mod http;
mod limited;
mod loki;
mod prometheus;
pub mod query_validator;
mod types;

pub use gateway::HttpToolGateway;
pub use limited::ConcurrencyLimitedGateway;
pub use rootcause_config::BackendKind;
pub use rootcause_utils::error::ToolError;
pub use types::{
    DashboardRef, LogLine, QueryRequest, QueryResult, Series, SeriesPoint, TimeRange, ToolGateway,
    parse_timestamp,
};

use rootcause_config::Config;
use std::sync::Arc;

/// Build the configured gateway with per-backend concurrency limits.
///
/// # Errors
///
/// Returns `ToolError::Transport` if an enabled backend has an unusable URL.
pub fn construct_gateway(config: &Config) -> Result<Arc<dyn ToolGateway>, ToolError> {
    let gateway = HttpToolGateway::from_config(config)?;
    Ok(Arc::new(ConcurrencyLimitedGateway::from_config(gateway, config)))
}
