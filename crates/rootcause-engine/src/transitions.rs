//! Stage transition table.
//!
//! The workflow graph is fixed:
//!
//! ```text
//! analyze_input -> plan_investigation -> resolve_time_range -> investigate
//!                        ^                      |                  |
//!                        |                 (suspend)               v
//!                        +------ insufficient ------------ evaluate_results
//!                                                                  |
//!                                            sufficient / bound    v
//!                                                            generate_rca -> done
//! ```
//!
//! Every edge taken by the engine goes through [`next_step`]; an edge that
//! is not in the table is a [`StageError::InvalidTransition`].

use rootcause_store::Stage;
use rootcause_utils::error::StageError;

/// What a finished stage reports back to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    Proceed,
    Sufficient,
    Insufficient,
    /// Insufficient, but the iteration bound has been reached
    BoundReached,
    NeedsInput,
}

/// Where the engine goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stage(Stage),
    Suspend,
    Complete,
}

/// Look up the edge leaving `stage` on `signal`.
///
/// # Errors
///
/// Returns `StageError::InvalidTransition` for any pair outside the graph.
pub fn next_step(stage: Stage, signal: Signal) -> Result<Step, StageError> {
    let step = match (stage, signal) {
        (Stage::AnalyzeInput, Signal::Proceed) => Step::Stage(Stage::PlanInvestigation),
        (Stage::PlanInvestigation, Signal::Proceed) => Step::Stage(Stage::ResolveTimeRange),
        (Stage::ResolveTimeRange, Signal::Proceed) => Step::Stage(Stage::Investigate),
        (Stage::ResolveTimeRange, Signal::NeedsInput) => Step::Suspend,
        (Stage::Investigate, Signal::Proceed) => Step::Stage(Stage::EvaluateResults),
        (Stage::EvaluateResults, Signal::Sufficient | Signal::BoundReached) => {
            Step::Stage(Stage::GenerateRca)
        }
        (Stage::EvaluateResults, Signal::Insufficient) => Step::Stage(Stage::PlanInvestigation),
        (Stage::GenerateRca, Signal::Proceed) => Step::Complete,
        (stage, signal) => {
            return Err(StageError::InvalidTransition {
                stage: stage.to_string(),
                signal: signal.to_string(),
            });
        }
    };
    Ok(step)
}

/// Stages reachable from `stage` in one step.
#[must_use]
pub fn legal_next_stages(stage: Stage) -> Vec<Stage> {
    match stage {
        Stage::AnalyzeInput => vec![Stage::PlanInvestigation],
        Stage::PlanInvestigation => vec![Stage::ResolveTimeRange],
        Stage::ResolveTimeRange => vec![Stage::Investigate],
        Stage::Investigate => vec![Stage::EvaluateResults],
        Stage::EvaluateResults => vec![Stage::PlanInvestigation, Stage::GenerateRca],
        Stage::GenerateRca => vec![],
    }
}
