//! The workflow driver.
//!
//! [`WorkflowEngine::drive`] runs one investigation from whatever stage
//! its record names until the record stops being `running`: it completes,
//! fails, times out, or suspends for input. Each loop turn reads a fresh
//! snapshot, runs one stage executor (retrying a transient failure once),
//! picks the next stage from the transition table and commits output and
//! next stage in a single store update.
//!
//! Every decision is read back from the store, so driving a record that
//! was loaded from disk after a restart continues exactly where the
//! previous process stopped.
//!
//! # Retry policy
//!
//! | Stage | After the last failed attempt |
//! |-------|-------------------------------|
//! | `analyze_input`, `plan_investigation`, `resolve_time_range` | investigation `failed` |
//! | `investigate` | never fails; branch failures are evidence |
//! | `evaluate_results` | treated as an insufficient, malformed verdict |
//! | `generate_rca` | report with no root causes from the evidence alone |

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{Instrument, debug, warn};

use rootcause_llm::ReasoningService;
use rootcause_store::{Investigation, InvestigationStatus, InvestigationStore, Stage};
use rootcause_tools::ToolGateway;
use rootcause_utils::error::{StageError, StoreError};
use rootcause_utils::logging::{
    log_investigation_outcome, log_stage_complete, log_stage_error, log_stage_start, stage_span,
};
use rootcause_utils::redaction::redact_error_message;

use crate::settings::EngineSettings;
use crate::stages::generate::{ReportBody, build_report};
use crate::stages::{self, MAX_STAGE_ATTEMPTS, StageContext, StageOutput, evaluate, record_failure};
use crate::suspension::SuspensionController;
use crate::transitions::{Step, next_step};

pub struct WorkflowEngine {
    ctx: StageContext,
    suspension: SuspensionController,
}

/// How one stage run ended
enum StageRun {
    Finished(Result<StageOutput, StageError>),
    DeadlinePassed,
}

impl WorkflowEngine {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        gateway: Arc<dyn ToolGateway>,
        store: Arc<InvestigationStore>,
        settings: EngineSettings,
    ) -> Self {
        let suspension = SuspensionController::new(store.clone(), settings.suspension_timeout);
        Self {
            ctx: StageContext {
                reasoning,
                gateway,
                store,
                settings,
            },
            suspension,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<InvestigationStore> {
        &self.ctx.store
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.ctx.settings
    }

    #[must_use]
    pub fn suspension(&self) -> &SuspensionController {
        &self.suspension
    }

    /// Run `id` until it is no longer `running` and return where it stopped.
    ///
    /// Stage failures are recorded on the investigation, never returned.
    ///
    /// # Errors
    ///
    /// Only store failures: an unknown id, or a record that cannot be
    /// persisted.
    pub async fn drive(&self, id: &str) -> Result<InvestigationStatus, StoreError> {
        loop {
            let record = self.ctx.store.read(id)?;
            if record.status != InvestigationStatus::Running {
                log_investigation_outcome(id, record.status.as_ref(), record.iteration_count);
                return Ok(record.status);
            }
            if Utc::now() >= record.deadline {
                self.time_out(&record)?;
                continue;
            }

            let stage = record.current_stage;
            let span = stage_span(id, stage.as_ref(), record.iteration_count);
            let run = self.run_with_deadline(&record, stage).instrument(span).await;
            match run {
                StageRun::Finished(Ok(output)) => {
                    if let Err(err) = self.commit(&record, stage, output) {
                        self.fail(id, stage, &err)?;
                    }
                }
                StageRun::Finished(Err(err)) => self.fail(id, stage, &err)?,
                StageRun::DeadlinePassed => self.time_out(&record)?,
            }
        }
    }

    /// Run the stage, abandoning it when the investigation deadline passes.
    async fn run_with_deadline(&self, record: &Investigation, stage: Stage) -> StageRun {
        let remaining = (record.deadline - Utc::now()).to_std().unwrap_or_default();
        match tokio::time::timeout(remaining, self.run_stage(record, stage)).await {
            Ok(result) => StageRun::Finished(result),
            Err(_) => StageRun::DeadlinePassed,
        }
    }

    async fn run_stage(
        &self,
        record: &Investigation,
        stage: Stage,
    ) -> Result<StageOutput, StageError> {
        let id = record.id.as_str();
        let name = stage.as_ref();
        let mut attempt = 0;
        loop {
            attempt += 1;
            log_stage_start(id, name, attempt);
            let started = Instant::now();
            match stages::execute(&self.ctx, record, stage).await {
                Ok(output) => {
                    log_stage_complete(id, name, started.elapsed().as_millis());
                    return Ok(output);
                }
                Err(StageError::Store(err)) => return Err(StageError::Store(err)),
                Err(err) => {
                    let will_retry = err.is_transient() && attempt < MAX_STAGE_ATTEMPTS;
                    log_stage_error(id, name, &err.to_string(), will_retry);
                    record_failure(&self.ctx.store, id, name, record.iteration_count, attempt, &err)?;
                    if !will_retry {
                        return exhausted(record, stage, err);
                    }
                }
            }
        }
    }

    /// Commit `output` and move to the next stage.
    fn commit(
        &self,
        before: &Investigation,
        stage: Stage,
        output: StageOutput,
    ) -> Result<(), StageError> {
        let id = before.id.as_str();
        let signal = output.signal(before);
        let step = next_step(stage, signal)?;
        debug!(investigation_id = %id, %stage, %signal, ?step, "Transition");

        match step {
            Step::Stage(next) => {
                self.ctx.store.update(id, move |record| {
                    output.apply(record);
                    record.current_stage = next;
                    Ok(())
                })?;
            }
            Step::Suspend => {
                let prompt = match &output {
                    StageOutput::NeedsInput { prompt } => prompt.clone(),
                    _ => String::new(),
                };
                let record = self.suspension.suspend(id, stage, &prompt)?;
                if let Some(pending) = &record.pending_input {
                    self.suspension.schedule_expiry(id, pending.expires_at);
                }
            }
            Step::Complete => {
                self.ctx.store.update(id, move |record| {
                    output.apply(record);
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn fail(&self, id: &str, stage: Stage, err: &StageError) -> Result<(), StoreError> {
        let message = format!("{stage} failed: {}", redact_error_message(&err.to_string()));
        warn!(investigation_id = %id, %stage, error = %message, "Investigation failed");
        settle(self.ctx.store.update(id, move |record| {
            record.fail(InvestigationStatus::Failed, message);
            Ok(())
        }))
    }

    fn time_out(&self, record: &Investigation) -> Result<(), StoreError> {
        let message = format!(
            "investigation exceeded its deadline during {}",
            record.current_stage
        );
        warn!(investigation_id = %record.id, stage = %record.current_stage, "Investigation timed out");
        settle(self.ctx.store.update(&record.id, move |r| {
            r.fail(InvestigationStatus::TimedOut, message);
            Ok(())
        }))
    }
}

/// A record that finished concurrently is already where it needs to be.
fn settle(result: Result<Investigation, StoreError>) -> Result<(), StoreError> {
    match result {
        Ok(_) | Err(StoreError::Terminal { .. }) => Ok(()),
        Err(err) => Err(err),
    }
}

/// What a stage yields once its attempts are used up.
fn exhausted(
    record: &Investigation,
    stage: Stage,
    err: StageError,
) -> Result<StageOutput, StageError> {
    match stage {
        Stage::EvaluateResults => {
            warn!(investigation_id = %record.id, "Evaluation unavailable; treating evidence as insufficient");
            Ok(StageOutput::Evaluated(evaluate::unavailable(record, &err)))
        }
        Stage::GenerateRca => {
            warn!(investigation_id = %record.id, "Report reasoning unavailable; reporting evidence only");
            Ok(StageOutput::Reported(Box::new(build_report(
                record,
                ReportBody::default(),
            ))))
        }
        _ => Err(err),
    }
}
