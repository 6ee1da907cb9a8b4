//! Keyed investigation state with atomic per-record updates
//!
//! Records live in memory behind one mutex each; the map itself is only
//! locked long enough to find or insert a record. With a state directory,
//! every committed mutation is also written to `<state_dir>/<id>.json`
//! before it becomes visible, so a restarted process sees exactly what
//! readers saw.
//!
//! The write happens while the record's mutex is held, on whatever thread
//! called into the store. That keeps file contents in commit order and costs
//! one fsync per mutation, a handful per stage. The store is sized for tens
//! of concurrent investigations, not for high-rate writers.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use rootcause_utils::atomic_write::write_file_atomic;
use rootcause_utils::error::StoreError;

use crate::input::InvestigationInput;
use crate::model::{Evidence, Investigation};

type Slot = Arc<Mutex<Investigation>>;

pub struct InvestigationStore {
    records: RwLock<HashMap<String, Slot>>,
    state_dir: Option<Utf8PathBuf>,
}

impl std::fmt::Debug for InvestigationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner()).len();
        f.debug_struct("InvestigationStore")
            .field("state_dir", &self.state_dir)
            .field("records", &records)
            .finish()
    }
}

impl Default for InvestigationStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl InvestigationStore {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            state_dir: None,
        }
    }

    /// Open a durable store, loading every record found in `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Load` if the directory cannot be created or read,
    /// or a record file does not parse.
    pub fn open(state_dir: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let state_dir = Utf8PathBuf::from_path_buf(state_dir.as_ref().to_path_buf()).map_err(
            |p| StoreError::Load {
                path: p.display().to_string(),
                reason: "state directory path is not valid UTF-8".to_string(),
            },
        )?;
        std::fs::create_dir_all(&state_dir).map_err(|e| load_error(&state_dir, e))?;

        let mut records = HashMap::new();
        let entries = std::fs::read_dir(&state_dir).map_err(|e| load_error(&state_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| load_error(&state_dir, e))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.extension() != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| load_error(&path, e))?;
            let record: Investigation =
                serde_json::from_str(&content).map_err(|e| load_error(&path, e))?;
            records.insert(record.id.clone(), Arc::new(Mutex::new(record)));
        }

        debug!(state_dir = %state_dir, records = records.len(), "Opened investigation store");
        Ok(Self {
            records: RwLock::new(records),
            state_dir: Some(state_dir),
        })
    }

    #[must_use]
    pub fn state_dir(&self) -> Option<&Utf8Path> {
        self.state_dir.as_deref()
    }

    /// Insert a fresh record in `running` / `analyze_input`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `id` is taken; `Persist` if the record cannot be written.
    pub fn create(
        &self,
        id: &str,
        input: InvestigationInput,
        max_iterations: u32,
        deadline: DateTime<Utc>,
    ) -> Result<Investigation, StoreError> {
        let record = Investigation::new(id, input, max_iterations, deadline);
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(id) {
            return Err(StoreError::AlreadyExists { id: id.to_string() });
        }
        self.persist(&record)?;
        records.insert(id.to_string(), Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    /// Consistent snapshot of one record.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub fn read(&self, id: &str) -> Result<Investigation, StoreError> {
        let slot = self.slot(id)?;
        let record = lock(&slot).clone();
        Ok(record)
    }

    /// Apply `mutator` atomically and return the committed snapshot.
    ///
    /// The mutator works on a copy; nothing is committed if it fails or the
    /// result breaks a record invariant. Updates to one id are serialized.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Terminal` for records already finished, whatever the
    /// mutator returns, invariant violations, or `Persist`.
    pub fn update<F>(&self, id: &str, mutator: F) -> Result<Investigation, StoreError>
    where
        F: FnOnce(&mut Investigation) -> Result<(), StoreError>,
    {
        let slot = self.slot(id)?;
        let mut current = lock(&slot);
        if current.status.is_terminal() {
            return Err(StoreError::Terminal {
                id: id.to_string(),
                status: current.status.to_string(),
            });
        }

        let mut next = current.clone();
        mutator(&mut next)?;
        check_invariants(&current, &next)?;
        next.updated_at = Utc::now();

        self.persist(&next)?;
        *current = next.clone();
        Ok(next)
    }

    /// Append one evidence entry.
    ///
    /// # Errors
    ///
    /// As for [`InvestigationStore::update`].
    pub fn append_evidence(&self, id: &str, item: Evidence) -> Result<Investigation, StoreError> {
        self.update(id, |record| {
            record.evidence.push(item);
            Ok(())
        })
    }

    /// Every record, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Investigation> {
        let slots: Vec<Slot> = self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut records: Vec<Investigation> = slots.iter().map(|slot| lock(slot).clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    fn slot(&self, id: &str) -> Result<Slot, StoreError> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    fn persist(&self, record: &Investigation) -> Result<(), StoreError> {
        let Some(dir) = &self.state_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}.json", record.id));
        let content = serde_json::to_string_pretty(record).map_err(|e| StoreError::Persist {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        write_file_atomic(&path, &content).map_err(|e| {
            warn!(path = %path, error = %e, "Failed to persist investigation");
            StoreError::Persist {
                path: path.to_string(),
                reason: format!("{e:#}"),
            }
        })
    }
}

fn lock(slot: &Slot) -> MutexGuard<'_, Investigation> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

fn load_error(path: &Utf8Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Load {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

fn check_invariants(before: &Investigation, after: &Investigation) -> Result<(), StoreError> {
    let id = &before.id;
    let rejected = |reason: &str| StoreError::Rejected {
        id: id.clone(),
        reason: reason.to_string(),
    };

    if after.id != before.id || after.input != before.input {
        return Err(rejected("id and input are immutable"));
    }
    if after.status != before.status && !before.status.can_transition_to(after.status) {
        return Err(StoreError::InvalidTransition {
            id: id.clone(),
            from: before.status.to_string(),
            to: after.status.to_string(),
        });
    }
    if after.iteration_count > after.max_iterations {
        return Err(rejected("iteration_count exceeds max_iterations"));
    }
    if after.iteration_count < before.iteration_count {
        return Err(rejected("iteration_count cannot decrease"));
    }
    if after.evidence.len() < before.evidence.len()
        || after.evidence[..before.evidence.len()] != before.evidence[..]
    {
        return Err(rejected("evidence is append-only"));
    }
    if before.report.is_some() && after.report != before.report {
        return Err(StoreError::ReportAlreadyGenerated { id: id.clone() });
    }
    if after.report.is_some() && after.status != crate::InvestigationStatus::Completed {
        return Err(rejected("a report requires status completed"));
    }
    Ok(())
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh opaque id: `inv-` plus 16 hex digits of a BLAKE3 digest over the
/// seed, the current time and a process-local counter.
#[must_use]
pub fn new_investigation_id(seed: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        &Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    hasher.update(&ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("inv-{}", &hex[..16])
}
