//! Human-in-the-loop pauses.
//!
//! Suspension is nothing but persisted state: a `waiting_for_input`
//! status and a [`PendingInput`] marker carrying the expiry. Resuming and
//! expiring read only the store, so a restarted process can pick up a
//! suspended investigation where it stopped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use rootcause_store::{
    Investigation, InvestigationStatus, InvestigationStore, PendingInput, Stage, SuppliedInput,
};
use rootcause_utils::error::{InvestigationError, StoreError};

use crate::settings::offset;

#[derive(Debug, Clone)]
pub struct SuspensionController {
    store: Arc<InvestigationStore>,
    window: Duration,
}

impl SuspensionController {
    pub fn new(store: Arc<InvestigationStore>, window: Duration) -> Self {
        Self { store, window }
    }

    /// How long a suspended investigation waits
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Mark `id` as waiting for input requested by `stage`.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including a terminal record.
    pub fn suspend(
        &self,
        id: &str,
        stage: Stage,
        prompt: &str,
    ) -> Result<Investigation, StoreError> {
        let now = Utc::now();
        let pending = PendingInput {
            stage,
            prompt: prompt.to_string(),
            requested_at: now,
            expires_at: offset(now, self.window),
        };
        let record = self.store.update(id, move |record| {
            record.status = InvestigationStatus::WaitingForInput;
            record.current_stage = stage;
            record.pending_input = Some(pending);
            Ok(())
        })?;
        info!(investigation_id = %id, %stage, "Investigation waiting for input");
        Ok(record)
    }

    /// Hand `value` to a waiting investigation and mark it running again.
    ///
    /// The deadline is pushed back by the time spent waiting. The caller
    /// re-drives the engine, which re-enters the stage that asked.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id
    /// - `NotWaitingForInput` when the investigation is not suspended
    /// - `SuspensionExpired` when the window has passed; the record is
    ///   marked `timed_out` first
    pub fn resume(&self, id: &str, value: SuppliedInput) -> Result<Investigation, InvestigationError> {
        let now = Utc::now();
        let current = self.store.read(id)?;
        check_waiting(&current)?;
        if is_expired(&current, now) {
            self.expire(id)?;
            return Err(InvestigationError::SuspensionExpired { id: id.to_string() });
        }

        let result = self.store.update(id, move |record| {
            // Re-checked under the record lock; a concurrent resume or expiry wins.
            let Some(pending) = record.pending_input.take() else {
                return Err(StoreError::Rejected {
                    id: record.id.clone(),
                    reason: format!("not waiting for input (status: {})", record.status),
                });
            };
            if record.status != InvestigationStatus::WaitingForInput || pending.expires_at <= now {
                return Err(StoreError::Rejected {
                    id: record.id.clone(),
                    reason: "suspension no longer open".to_string(),
                });
            }
            record.deadline += now - pending.requested_at;
            record.current_stage = pending.stage;
            record.supplied_input = Some(value);
            record.status = InvestigationStatus::Running;
            Ok(())
        });

        match result {
            Ok(record) => {
                info!(investigation_id = %id, stage = %record.current_stage, "Investigation resumed with supplied input");
                Ok(record)
            }
            Err(StoreError::Rejected { .. }) => {
                let latest = self.store.read(id)?;
                check_waiting(&latest)?;
                self.expire(id)?;
                Err(InvestigationError::SuspensionExpired { id: id.to_string() })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Time out `id` if it is still waiting and its window has passed.
    ///
    /// Returns whether the record was expired. Safe to call at any time.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than the record being terminal.
    pub fn expire(&self, id: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let window = self.window;
        let result = self.store.update(id, move |record| {
            if !is_expired(record, now) {
                return Err(StoreError::Rejected {
                    id: record.id.clone(),
                    reason: "not an expired suspension".to_string(),
                });
            }
            record.fail(
                InvestigationStatus::TimedOut,
                format!(
                    "no input supplied within the {}s suspension window",
                    window.as_secs()
                ),
            );
            Ok(())
        });
        match result {
            Ok(_) => {
                warn!(investigation_id = %id, "Suspension expired; investigation timed out");
                Ok(true)
            }
            Err(StoreError::Rejected { .. } | StoreError::Terminal { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Expire `id` once its current suspension window passes.
    ///
    /// Spawns a Tokio task; must be called inside a runtime.
    pub fn schedule_expiry(&self, id: &str, expires_at: DateTime<Utc>) {
        let controller = self.clone();
        let id = id.to_string();
        let delay = (expires_at - Utc::now()).to_std().unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = controller.expire(&id) {
                warn!(investigation_id = %id, error = %err, "Could not expire suspension");
            }
        });
    }
}

fn check_waiting(record: &Investigation) -> Result<(), InvestigationError> {
    if record.status == InvestigationStatus::WaitingForInput && record.pending_input.is_some() {
        Ok(())
    } else {
        Err(InvestigationError::NotWaitingForInput {
            id: record.id.clone(),
            status: record.status.to_string(),
        })
    }
}

fn is_expired(record: &Investigation, now: DateTime<Utc>) -> bool {
    record.status == InvestigationStatus::WaitingForInput
        && record
            .pending_input
            .as_ref()
            .is_some_and(|pending| pending.expires_at <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rootcause_store::{InvestigationInput, TimeRange};

    fn setup(window: Duration) -> (Arc<InvestigationStore>, SuspensionController) {
        let store = Arc::new(InvestigationStore::in_memory());
        store
            .create(
                "inv-1",
                InvestigationInput::Query { text: "why".into() },
                3,
                Utc::now() + chrono::Duration::minutes(2),
            )
            .unwrap();
        let controller = SuspensionController::new(store.clone(), window);
        (store, controller)
    }

    fn range() -> SuppliedInput {
        SuppliedInput::Range(TimeRange::ending_at(Utc::now(), Duration::from_secs(600)))
    }

    #[test]
    fn debug_output_names_the_store_and_window() {
        let (_store, controller) = setup(Duration::from_secs(60));
        let text = format!("{controller:?}");
        assert!(text.contains("InvestigationStore"));
        assert!(text.contains("records: 1"));
        assert!(text.contains("60s"));
    }

    #[test]
    fn suspend_then_resume() {
        let (store, controller) = setup(Duration::from_secs(60));
        let before = store.read("inv-1").unwrap().deadline;
        controller
            .suspend("inv-1", Stage::ResolveTimeRange, "when?")
            .unwrap();

        let waiting = store.read("inv-1").unwrap();
        assert_eq!(waiting.status, InvestigationStatus::WaitingForInput);
        assert_eq!(waiting.pending_input.as_ref().unwrap().prompt, "when?");

        let resumed = controller.resume("inv-1", range()).unwrap();
        assert_eq!(resumed.status, InvestigationStatus::Running);
        assert_eq!(resumed.current_stage, Stage::ResolveTimeRange);
        assert!(resumed.pending_input.is_none());
        assert!(matches!(resumed.supplied_input, Some(SuppliedInput::Range(_))));
        assert!(resumed.deadline >= before);
    }

    #[test]
    fn resume_requires_a_suspension() {
        let (_, controller) = setup(Duration::from_secs(60));
        let err = controller.resume("inv-1", range()).unwrap_err();
        assert!(matches!(err, InvestigationError::NotWaitingForInput { .. }));

        let err = controller.resume("missing", range()).unwrap_err();
        assert!(matches!(err, InvestigationError::NotFound { .. }));
    }

    #[test]
    fn expired_suspension_times_out() {
        let (store, controller) = setup(Duration::ZERO);
        controller
            .suspend("inv-1", Stage::ResolveTimeRange, "when?")
            .unwrap();

        let err = controller.resume("inv-1", range()).unwrap_err();
        assert!(matches!(err, InvestigationError::SuspensionExpired { .. }));
        let record = store.read("inv-1").unwrap();
        assert_eq!(record.status, InvestigationStatus::TimedOut);
        assert!(record.error.unwrap().contains("suspension window"));

        assert!(!controller.expire("inv-1").unwrap());
    }

    #[test]
    fn expire_ignores_running_investigations() {
        let (store, controller) = setup(Duration::ZERO);
        assert!(!controller.expire("inv-1").unwrap());
        assert_eq!(
            store.read("inv-1").unwrap().status,
            InvestigationStatus::Running
        );
    }

    #[tokio::test]
    async fn scheduled_expiry_fires() {
        let (store, controller) = setup(Duration::from_millis(20));
        let record = controller
            .suspend("inv-1", Stage::ResolveTimeRange, "when?")
            .unwrap();
        controller.schedule_expiry("inv-1", record.pending_input.unwrap().expires_at);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            store.read("inv-1").unwrap().status,
            InvestigationStatus::TimedOut
        );
    }
}
