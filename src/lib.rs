//! rootcause: iterative root-cause investigations over metrics and logs
//!
//! An investigation starts from an alert or a free-text question, plans
//! metric and log queries with a reasoning service, runs them concurrently,
//! judges whether the evidence is sufficient and loops back to planning
//! until it is or the iteration bound is reached. The result is a
//! root-cause report.
//!
//! This crate re-exports the stable surface of the workspace crates and
//! hosts the `rootcause` command-line interface.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use rootcause::{Config, InvestigationInput, InvestigationService};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder()
//!     .max_iterations(3)
//!     .state_dir(".rootcause/state")
//!     .build()?;
//! let service = InvestigationService::from_config(&config)?;
//! let id = service.start(InvestigationInput::Query {
//!     text: "5xx on checkout between 10:00 and 10:30 UTC today".into(),
//! })?;
//! let view = service.wait_for_settled(&id, Duration::from_millis(250)).await?;
//! println!("{id}: {}", view.status);
//! # Ok(())
//! # }
//! ```

pub mod cli;

pub use rootcause_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use rootcause_engine::{
    EngineSettings, InvestigationService, RecoverySummary, ReportView, StatusView, WorkflowEngine,
};
pub use rootcause_llm::ReasoningService;
pub use rootcause_store::{
    Alert, Investigation, InvestigationInput, InvestigationStatus, InvestigationStore, RcaReport,
    Stage, SuppliedInput, TimeRange,
};
pub use rootcause_tools::{BackendKind, ToolGateway};
pub use rootcause_utils::error::{InvestigationError, RootCauseError};
pub use rootcause_utils::exit_codes::ExitCode;
