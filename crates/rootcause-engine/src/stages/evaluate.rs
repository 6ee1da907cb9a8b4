//! `evaluate_results`: is the evidence enough?

use chrono::Utc;
use tracing::warn;

use rootcause_store::{EvaluationFeedback, EvaluationRecord, Investigation};
use rootcause_utils::error::StageError;
use rootcause_utils::redaction::redact_error_message;

use super::{StageContext, StageOutput};
use crate::parse::parse_verdict;
use crate::prompts;

const STAGE: &str = "evaluate_results";

pub(crate) async fn run(
    ctx: &StageContext,
    record: &Investigation,
) -> Result<StageOutput, StageError> {
    let iteration = record.iteration_count;
    let raw = ctx
        .reason(record, STAGE, prompts::evaluate_messages(record, iteration))
        .await?;
    Ok(StageOutput::Evaluated(evaluation_from(record, &raw)))
}

/// Turn a verdict into an evaluation record. Never fails.
pub(crate) fn evaluation_from(record: &Investigation, raw: &str) -> EvaluationRecord {
    let verdict = parse_verdict(raw);
    if verdict.malformed {
        warn!(
            investigation_id = %record.id,
            iteration = record.iteration_count,
            "Malformed sufficiency verdict; treating evidence as insufficient"
        );
    }
    let feedback = verdict.feedback.map(|mut feedback| {
        if feedback.previous_queries_attempted.is_empty() {
            feedback.previous_queries_attempted = record.queries_attempted();
        }
        feedback
    });
    EvaluationRecord {
        iteration: record.iteration_count,
        sufficient: verdict.sufficient,
        malformed: verdict.malformed,
        feedback,
        at: Utc::now(),
    }
}

/// Evaluation used when the reasoning call failed on every attempt.
pub(crate) fn unavailable(record: &Investigation, err: &StageError) -> EvaluationRecord {
    EvaluationRecord {
        iteration: record.iteration_count,
        sufficient: false,
        malformed: true,
        feedback: Some(EvaluationFeedback {
            previous_queries_attempted: record.queries_attempted(),
            reasoning: format!(
                "evaluation unavailable: {}",
                redact_error_message(&err.to_string())
            ),
            ..EvaluationFeedback::default()
        }),
        at: Utc::now(),
    }
}
