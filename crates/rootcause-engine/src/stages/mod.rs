//! Stage executors.
//!
//! An executor reads a snapshot of the record and returns a
//! [`StageOutput`]; it never writes the record itself, except the
//! evidence branches which append their findings as they finish. The
//! engine commits the output together with the next stage in one store
//! update, so re-running an executor whose output was not committed is
//! safe.

pub(crate) mod analyze;
pub(crate) mod evaluate;
pub(crate) mod generate;
pub(crate) mod investigate;
pub(crate) mod plan;
pub(crate) mod resolve;

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use rootcause_llm::{Message, ReasoningRequest, ReasoningService};
use rootcause_store::{
    EvaluationRecord, Intent, Investigation, InvestigationStatus, InvestigationStore, QueryPlan,
    RcaReport, Stage, StageFailure, StoreError, TimeRange, TimeRangeSource,
};
use rootcause_tools::ToolGateway;
use rootcause_utils::error::StageError;
use rootcause_utils::redaction::redact_error_message;

use crate::settings::EngineSettings;
use crate::transitions::Signal;

/// Attempts per stage or branch: the first plus one retry
pub const MAX_STAGE_ATTEMPTS: u32 = 2;

/// Result of one stage execution, committed by the engine
#[derive(Debug, Clone)]
pub enum StageOutput {
    Analyzed(Intent),
    Planned(QueryPlan),
    Resolved {
        range: TimeRange,
        source: Option<TimeRangeSource>,
    },
    NeedsInput {
        prompt: String,
    },
    /// Branch evidence was appended while the stage ran
    Investigated,
    Evaluated(EvaluationRecord),
    Reported(Box<RcaReport>),
}

impl StageOutput {
    /// The transition signal this output produces against `record`.
    #[must_use]
    pub fn signal(&self, record: &Investigation) -> Signal {
        match self {
            Self::NeedsInput { .. } => Signal::NeedsInput,
            Self::Evaluated(evaluation) if evaluation.sufficient => Signal::Sufficient,
            Self::Evaluated(_) if record.iteration_count >= record.max_iterations => {
                Signal::BoundReached
            }
            Self::Evaluated(_) => Signal::Insufficient,
            _ => Signal::Proceed,
        }
    }

    /// Fold the output into the record.
    pub fn apply(self, record: &mut Investigation) {
        match self {
            Self::Analyzed(intent) => record.intent = Some(intent),
            Self::Planned(plan) => {
                record.iteration_count = plan.iteration;
                record.plans.push(plan);
            }
            Self::Resolved { range, source } => {
                if record.time_range.as_ref() != Some(&range) {
                    record.time_range = Some(range);
                    record.time_range_source = source;
                }
                record.supplied_input = None;
            }
            Self::NeedsInput { .. } | Self::Investigated => {}
            Self::Evaluated(evaluation) => record.evaluations.push(evaluation),
            Self::Reported(report) => {
                record.report = Some(*report);
                record.status = InvestigationStatus::Completed;
            }
        }
    }
}

/// Collaborators shared by every executor
pub struct StageContext {
    pub reasoning: Arc<dyn ReasoningService>,
    pub gateway: Arc<dyn ToolGateway>,
    pub store: Arc<InvestigationStore>,
    pub settings: EngineSettings,
}

impl StageContext {
    /// One reasoning call on behalf of `stage`, returning the raw text.
    pub(crate) async fn reason(
        &self,
        record: &Investigation,
        stage: &str,
        messages: Vec<Message>,
    ) -> Result<String, StageError> {
        let request = ReasoningRequest::new(
            record.id.clone(),
            stage,
            self.settings.reasoning_timeout,
            messages,
        )
        .with_metadata("iteration", serde_json::json!(record.iteration_count));
        let started = Utc::now();
        let completion = self
            .reasoning
            .complete(request)
            .await
            .map_err(|source| StageError::Reasoning {
                stage: stage.to_string(),
                source,
            })?;
        debug!(
            investigation_id = %record.id,
            stage,
            provider = %completion.provider,
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "Reasoning call completed"
        );
        Ok(completion.text)
    }
}

/// Append a [`StageFailure`] for one failed attempt.
pub(crate) fn record_failure(
    store: &InvestigationStore,
    id: &str,
    stage: &str,
    iteration: u32,
    attempt: u32,
    err: &StageError,
) -> Result<(), StoreError> {
    let failure = StageFailure {
        stage: stage.to_string(),
        iteration,
        attempt,
        error: redact_error_message(&err.to_string()),
        transient: err.is_transient(),
        at: Utc::now(),
    };
    store.update(id, move |record| {
        record.failures.push(failure);
        Ok(())
    })?;
    Ok(())
}

/// Run the executor for `stage` once.
pub(crate) async fn execute(
    ctx: &StageContext,
    record: &Investigation,
    stage: Stage,
) -> Result<StageOutput, StageError> {
    match stage {
        Stage::AnalyzeInput => analyze::run(ctx, record).await,
        Stage::PlanInvestigation => plan::run(ctx, record).await,
        Stage::ResolveTimeRange => resolve::run(ctx, record).await,
        Stage::Investigate => investigate::run(ctx, record).await,
        Stage::EvaluateResults => evaluate::run(ctx, record).await,
        Stage::GenerateRca => generate::run(ctx, record).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rootcause_store::InvestigationInput;

    fn record(count: u32, max: u32) -> Investigation {
        let mut record = Investigation::new(
            "inv-1",
            InvestigationInput::Query { text: "q".into() },
            max,
            Utc::now() + Duration::minutes(1),
        );
        record.iteration_count = count;
        record
    }

    fn evaluation(sufficient: bool) -> StageOutput {
        StageOutput::Evaluated(EvaluationRecord {
            iteration: 1,
            sufficient,
            malformed: false,
            feedback: None,
            at: Utc::now(),
        })
    }

    #[test]
    fn insufficient_at_the_bound_forces_the_report() {
        assert_eq!(evaluation(false).signal(&record(1, 2)), Signal::Insufficient);
        assert_eq!(evaluation(false).signal(&record(2, 2)), Signal::BoundReached);
        assert_eq!(evaluation(true).signal(&record(2, 2)), Signal::Sufficient);
    }

    #[test]
    fn planning_sets_the_iteration_count() {
        let mut r = record(0, 3);
        StageOutput::Planned(QueryPlan {
            iteration: 1,
            ..QueryPlan::default()
        })
        .apply(&mut r);
        assert_eq!(r.iteration_count, 1);
        assert_eq!(r.plans.len(), 1);
    }

    #[test]
    fn resolving_consumes_supplied_input() {
        let mut r = record(1, 3);
        let range = TimeRange::ending_at(Utc::now(), std::time::Duration::from_secs(600));
        r.supplied_input = Some(rootcause_store::SuppliedInput::Range(range));
        StageOutput::Resolved {
            range,
            source: Some(TimeRangeSource::Supplied),
        }
        .apply(&mut r);
        assert_eq!(r.time_range, Some(range));
        assert_eq!(r.time_range_source, Some(TimeRangeSource::Supplied));
        assert!(r.supplied_input.is_none());
    }
}
