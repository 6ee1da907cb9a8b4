//! Investigation workflow engine for rootcause
//!
//! Drives an investigation through `analyze_input`, `plan_investigation`,
//! `resolve_time_range`, the concurrent metrics and logs branches,
//! `evaluate_results` and `generate_rca`, looping back to planning while
//! evidence is insufficient and the iteration bound allows.
//!
//! Callers use [`InvestigationService`]; [`WorkflowEngine`] and the stage
//! modules are exposed for embedding and tests.

pub mod engine;
pub mod normalize;
pub mod parse;
pub mod prompts;
pub mod report;
pub mod sanitizer;
pub mod service;
pub mod settings;
pub mod stages;
pub mod suspension;
pub mod transitions;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use engine::WorkflowEngine;
pub use service::{InvestigationService, RecoverySummary, ReportView, StatusView};
pub use settings::EngineSettings;
pub use stages::{MAX_STAGE_ATTEMPTS, StageOutput};
pub use suspension::SuspensionController;
pub use transitions::{Signal, Step, legal_next_stages, next_step};
