//! Investigation records and the investigation store
//!
//! The store owns no workflow logic: it keeps one record per investigation,
//! hands out consistent snapshots, and applies serialized, validated
//! mutations. Everything the engine learns is written here.

mod input;
mod model;
mod status;
mod store;

pub use input::{Alert, InvestigationInput, Severity};
pub use model::{
    Anomaly, BranchError, ErrorPattern, EvaluationFeedback, EvaluationRecord, Evidence,
    EvidenceOutcome, Intent, Investigation, LogExcerpt, LogsFindings, MetricsFindings,
    PendingInput, QueryOutcome, QueryPlan, RcaReport, RootCause, SeriesSummary, StageFailure,
    SuppliedInput, TimeRangeSource,
};
pub use rootcause_tools::TimeRange;
pub use rootcause_utils::error::StoreError;
pub use status::{Branch, InvestigationStatus, Stage};
pub use store::{InvestigationStore, new_investigation_id};
