//! The boundary API.
//!
//! [`InvestigationService`] is what callers hold: the CLI, integration
//! tests and any embedding process. It starts investigations in the
//! background and answers status and report queries from the store
//! without blocking on the engine.
//!
//! # Operations
//!
//! | Operation | Method |
//! |-----------|--------|
//! | `StartInvestigation` | [`InvestigationService::start`] |
//! | `GetStatus` | [`InvestigationService::status`] |
//! | `GetReport` | [`InvestigationService::report`] |
//! | `SupplyInput` | [`InvestigationService::supply_input`] |
//! | `ListInvestigations` | [`InvestigationService::list`] |
//! | `Recover` | [`InvestigationService::recover`] |
//! | `WaitForSettled` | [`InvestigationService::wait_for_settled`] |
//!
//! Reads never mutate a record. At most one driver task runs per
//! investigation; a resume that races with a finishing driver is picked up
//! by that driver instead of starting a second one.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use rootcause_config::Config;
//! use rootcause_engine::{InvestigationService, ReportView};
//! use rootcause_store::InvestigationInput;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = InvestigationService::from_config(&Config::minimal_for_testing())?;
//! let id = service.start(InvestigationInput::Query {
//!     text: "why did checkout latency spike at 14:05?".into(),
//! })?;
//! let view = service.wait_for_settled(&id, Duration::from_millis(200)).await?;
//! println!("{} is {}", view.id, view.status);
//! if let ReportView::Ready(report) = service.report(&id)? {
//!     println!("{}", report.markdown);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use rootcause_config::Config;
use rootcause_llm::{ReasoningService, construct_service};
use rootcause_store::{
    Branch, Investigation, InvestigationInput, InvestigationStatus, InvestigationStore, RcaReport, Stage,
    SuppliedInput, TimeRange, new_investigation_id,
};
use rootcause_tools::{ToolGateway, construct_gateway};
use rootcause_utils::error::{InvestigationError, RootCauseError, StoreError};

use crate::engine::WorkflowEngine;
use crate::settings::{EngineSettings, offset};

/// `GetStatus` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub id: String,
    pub status: InvestigationStatus,
    pub current_stage: Stage,
    /// `investigate_metrics` / `investigate_logs` while the fan-out runs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub active_branches: Vec<Branch>,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub trigger: String,
    pub error: Option<String>,
    /// Question shown to the operator while waiting for input
    pub input_prompt: Option<String>,
    pub input_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Investigation> for StatusView {
    fn from(record: &Investigation) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            current_stage: record.current_stage,
            active_branches: record.branches_in_flight(),
            iteration_count: record.iteration_count,
            max_iterations: record.max_iterations,
            trigger: record.input.trigger(),
            error: record.error.clone(),
            input_prompt: record.pending_input.as_ref().map(|p| p.prompt.clone()),
            input_expires_at: record.pending_input.as_ref().map(|p| p.expires_at),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// `GetReport` answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportView {
    Ready(Box<RcaReport>),
    /// Still running or waiting for input
    NotYetAvailable { status: InvestigationStatus },
    /// Failed or timed out; no report will be produced
    Unavailable {
        status: InvestigationStatus,
        error: String,
    },
}

/// What [`InvestigationService::recover`] found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoverySummary {
    /// Running records handed back to a driver
    pub resumed: usize,
    /// Suspended records whose expiry timer was re-armed
    pub waiting: usize,
    /// Suspended records found past their window and timed out
    pub expired: usize,
}

struct ServiceInner {
    engine: WorkflowEngine,
    active: Mutex<HashSet<String>>,
}

#[derive(Clone)]
pub struct InvestigationService {
    inner: Arc<ServiceInner>,
}

impl InvestigationService {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        gateway: Arc<dyn ToolGateway>,
        store: Arc<InvestigationStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                engine: WorkflowEngine::new(reasoning, gateway, store, settings),
                active: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Wire the configured reasoning service, gateway and store.
    ///
    /// The store is durable when `store.state_dir` is set. Persisted
    /// suspensions whose window has already passed are timed out before the
    /// service is returned, since the process that armed their expiry timers
    /// may be gone. Call [`recover`](Self::recover) afterwards to pick up the
    /// rest of the persisted work.
    ///
    /// # Errors
    ///
    /// Returns `RootCauseError` when a backend cannot be constructed or the
    /// state directory cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self, RootCauseError> {
        let store = match &config.store.state_dir {
            Some(dir) => InvestigationStore::open(dir)?,
            None => InvestigationStore::in_memory(),
        };
        let reasoning = construct_service(config)?;
        let gateway = construct_gateway(config)?;
        let service = Self::new(
            reasoning,
            gateway,
            Arc::new(store),
            EngineSettings::from_config(config),
        );
        let expired = service.expire_overdue()?;
        if expired > 0 {
            info!(expired, "Timed out suspensions past their input window");
        }
        Ok(service)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<InvestigationStore> {
        self.inner.engine.store()
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        self.inner.engine.settings()
    }

    /// Create an investigation and start driving it in the background.
    ///
    /// Returns as soon as the record exists. Problems with the input itself
    /// surface later as a `failed` status. Must be called inside a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub fn start(&self, input: InvestigationInput) -> Result<String, InvestigationError> {
        let settings = self.settings();
        let id = new_investigation_id(&input.trigger());
        let deadline = offset(Utc::now(), settings.investigation_timeout);
        let record = self
            .store()
            .create(&id, input, settings.max_iterations, deadline)?;
        info!(
            investigation_id = %id,
            trigger = %record.input.trigger(),
            max_iterations = record.max_iterations,
            "Investigation started"
        );
        self.spawn_drive(&id);
        Ok(id)
    }

    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub fn status(&self, id: &str) -> Result<StatusView, InvestigationError> {
        Ok(StatusView::from(&self.store().read(id)?))
    }

    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub fn report(&self, id: &str) -> Result<ReportView, InvestigationError> {
        let record = self.store().read(id)?;
        let view = match (record.status, record.report) {
            (InvestigationStatus::Completed, Some(report)) => ReportView::Ready(Box::new(report)),
            (status @ (InvestigationStatus::Failed | InvestigationStatus::TimedOut), _) => {
                ReportView::Unavailable {
                    status,
                    error: record
                        .error
                        .unwrap_or_else(|| format!("investigation {status}")),
                }
            }
            (status, _) => ReportView::NotYetAvailable { status },
        };
        Ok(view)
    }

    /// Resume a suspended investigation with `value`.
    ///
    /// # Errors
    ///
    /// - `InvalidSuppliedInput` for empty text or a backwards range
    /// - `NotFound`, `NotWaitingForInput`
    /// - `SuspensionExpired` when the window has passed; the investigation
    ///   is `timed_out` afterwards
    pub fn supply_input(
        &self,
        id: &str,
        value: SuppliedInput,
    ) -> Result<StatusView, InvestigationError> {
        match &value {
            SuppliedInput::Text(text) if text.trim().is_empty() => {
                return Err(InvestigationError::InvalidSuppliedInput(
                    "supplied text is empty".to_string(),
                ));
            }
            SuppliedInput::Range(range) => {
                TimeRange::new(range.start, range.end)
                    .map_err(InvestigationError::InvalidSuppliedInput)?;
            }
            SuppliedInput::Text(_) => {}
        }

        let record = self.inner.engine.suspension().resume(id, value)?;
        self.spawn_drive(id);
        Ok(StatusView::from(&record))
    }

    /// Every known investigation, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<StatusView> {
        self.store().list().iter().map(StatusView::from).collect()
    }

    /// Time out suspended investigations whose window has passed.
    ///
    /// Returns how many were expired.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn expire_overdue(&self) -> Result<usize, StoreError> {
        let suspension = self.inner.engine.suspension();
        let now = Utc::now();
        let mut expired = 0;
        for record in self.store().list() {
            let overdue = record.status == InvestigationStatus::WaitingForInput
                && record
                    .pending_input
                    .as_ref()
                    .is_some_and(|p| p.expires_at <= now);
            if overdue && suspension.expire(&record.id)? {
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Pick up persisted work after a restart.
    ///
    /// Overdue suspensions time out, open ones get their expiry timer back,
    /// and running investigations are driven again from their recorded
    /// stage. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn recover(&self) -> Result<RecoverySummary, StoreError> {
        let mut summary = RecoverySummary {
            expired: self.expire_overdue()?,
            ..RecoverySummary::default()
        };
        for record in self.store().list() {
            match (record.status, &record.pending_input) {
                (InvestigationStatus::WaitingForInput, Some(pending)) => {
                    self.inner
                        .engine
                        .suspension()
                        .schedule_expiry(&record.id, pending.expires_at);
                    summary.waiting += 1;
                }
                (InvestigationStatus::Running, _) => {
                    self.spawn_drive(&record.id);
                    summary.resumed += 1;
                }
                _ => {}
            }
        }
        info!(
            resumed = summary.resumed,
            waiting = summary.waiting,
            expired = summary.expired,
            "Recovered persisted investigations"
        );
        Ok(summary)
    }

    /// Poll until `id` is terminal or waiting for input.
    ///
    /// Read-only: it never drives the investigation itself.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn wait_for_settled(
        &self,
        id: &str,
        poll_interval: Duration,
    ) -> Result<StatusView, InvestigationError> {
        loop {
            let view = self.status(id)?;
            if view.status.is_settled() {
                return Ok(view);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Whether a driver task currently owns `id`
    #[must_use]
    pub fn is_driving(&self, id: &str) -> bool {
        self.inner.lock_active().contains(id)
    }

    fn spawn_drive(&self, id: &str) {
        if !self.inner.lock_active().insert(id.to_string()) {
            return;
        }
        let service = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            loop {
                let result = service.inner.engine.drive(&id).await;
                let mut active = service.inner.lock_active();
                // A resume that landed after the driver returned finds the
                // id still active and leaves the work to this loop.
                let resumed = result.is_ok()
                    && service
                        .store()
                        .read(&id)
                        .is_ok_and(|r| r.status == InvestigationStatus::Running);
                if !resumed {
                    active.remove(&id);
                    if let Err(err) = result {
                        error!(investigation_id = %id, error = %err, "Investigation driver stopped");
                    }
                    break;
                }
            }
        });
    }
}

impl ServiceInner {
    fn lock_active(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}
