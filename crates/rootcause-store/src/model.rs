//! The investigation record and the value types it accumulates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rootcause_tools::query_validator::RejectedQuery;
use rootcause_tools::{DashboardRef, TimeRange};

use crate::input::{Alert, InvestigationInput};
use crate::status::{Branch, InvestigationStatus, Stage};

/// Normalized reading of the input, produced by `analyze_input`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Intent {
    pub description: String,
    #[serde(default)]
    pub target_instances: Vec<String>,
    /// Free-form time reference found in a question ("last night")
    #[serde(default)]
    pub time_reference: Option<String>,
    #[serde(default)]
    pub requested_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requested_end: Option<DateTime<Utc>>,
    /// The alert being investigated, when the input is an alert
    #[serde(default)]
    pub alert: Option<Alert>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// The reasoning output could not be parsed and the raw text was used
    #[serde(default)]
    pub degraded: bool,
}

/// Which queries to run in one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryPlan {
    pub iteration: u32,
    #[serde(default)]
    pub metrics_queries: Vec<String>,
    #[serde(default)]
    pub logs_queries: Vec<String>,
    #[serde(default)]
    pub target_instances: Vec<String>,
    /// Signals the plan expects to confirm or rule out
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub proposed_range: Option<TimeRange>,
    /// Generated queries dropped by validation
    #[serde(default)]
    pub rejected: Vec<RejectedQuery>,
}

impl QueryPlan {
    #[must_use]
    pub fn queries_for(&self, branch: Branch) -> &[String] {
        match branch {
            Branch::Metrics => &self.metrics_queries,
            Branch::Logs => &self.logs_queries,
        }
    }
}

/// Where the resolved time range came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeRangeSource {
    Supplied,
    AlertWindow,
    QueryBounds,
    Plan,
}

/// Outcome of a single backend query inside a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub result_count: usize,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub series: String,
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub last: f64,
}

/// A sample more than three standard deviations from its series mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub series: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsFindings {
    pub queries: Vec<QueryOutcome>,
    pub series: Vec<SeriesSummary>,
    pub anomalies: Vec<Anomaly>,
    #[serde(default)]
    pub related_dashboards: Vec<DashboardRef>,
    pub summary: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub pattern: String,
    pub count: usize,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogExcerpt {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub line: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogsFindings {
    pub queries: Vec<QueryOutcome>,
    pub total_lines: usize,
    pub level_counts: BTreeMap<String, usize>,
    pub error_patterns: Vec<ErrorPattern>,
    pub excerpts: Vec<LogExcerpt>,
    pub summary: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceOutcome {
    Metrics(MetricsFindings),
    Logs(LogsFindings),
    /// The branch failed after its retry; the error annotates evaluation
    Failed { error: String, attempts: u32 },
}

/// One entry of the append-only evidence log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub iteration: u32,
    pub branch: Branch,
    pub outcome: EvidenceOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl Evidence {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, EvidenceOutcome::Failed { .. })
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            EvidenceOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Why the evidence was judged insufficient, fed into the next plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvaluationFeedback {
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub additional_investigation_points: Vec<String>,
    #[serde(default)]
    pub previous_queries_attempted: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub iteration: u32,
    pub sufficient: bool,
    /// The verdict was missing or unreadable and defaulted to insufficient
    pub malformed: bool,
    #[serde(default)]
    pub feedback: Option<EvaluationFeedback>,
    pub at: DateTime<Utc>,
}

/// A failed attempt at a stage or branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub iteration: u32,
    pub attempt: u32,
    pub error: String,
    pub transient: bool,
    pub at: DateTime<Utc>,
}

/// Marker persisted while waiting for a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInput {
    pub stage: Stage,
    pub prompt: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Value handed to `SupplyInput`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SuppliedInput {
    Range(TimeRange),
    Text(String),
}

impl SuppliedInput {
    /// `START/END` parses as a range; anything else is free text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match TimeRange::parse_pair(raw.trim()) {
            Ok(range) => Self::Range(range),
            Err(_) => Self::Text(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    pub category: String,
    pub description: String,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchError {
    pub branch: Branch,
    pub iteration: u32,
    pub error: String,
}

/// Final root-cause report. One per investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaReport {
    pub trigger: String,
    pub root_causes: Vec<RootCause>,
    pub metrics_summary: String,
    pub logs_summary: String,
    pub recommendations: Vec<String>,
    pub log_excerpts: Vec<LogExcerpt>,
    pub related_dashboards: Vec<DashboardRef>,
    pub branch_errors: Vec<BranchError>,
    pub iterations: u32,
    pub forced_by_bound: bool,
    pub markdown: String,
    pub created_at: DateTime<Utc>,
}

/// The unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub status: InvestigationStatus,
    pub current_stage: Stage,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub input: InvestigationInput,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub plans: Vec<QueryPlan>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub time_range_source: Option<TimeRangeSource>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub evaluations: Vec<EvaluationRecord>,
    #[serde(default)]
    pub failures: Vec<StageFailure>,
    #[serde(default)]
    pub pending_input: Option<PendingInput>,
    #[serde(default)]
    pub supplied_input: Option<SuppliedInput>,
    #[serde(default)]
    pub report: Option<RcaReport>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Wall-clock limit; extended by time spent waiting for input
    pub deadline: DateTime<Utc>,
}

impl Investigation {
    pub fn new(
        id: impl Into<String>,
        input: InvestigationInput,
        max_iterations: u32,
        deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: InvestigationStatus::Running,
            current_stage: Stage::AnalyzeInput,
            iteration_count: 0,
            max_iterations,
            input,
            intent: None,
            plans: Vec::new(),
            time_range: None,
            time_range_source: None,
            evidence: Vec::new(),
            evaluations: Vec::new(),
            failures: Vec::new(),
            pending_input: None,
            supplied_input: None,
            report: None,
            error: None,
            created_at: now,
            updated_at: now,
            deadline,
        }
    }

    /// Plan of the current iteration
    #[must_use]
    pub fn current_plan(&self) -> Option<&QueryPlan> {
        self.plans.last()
    }

    #[must_use]
    pub fn last_evaluation(&self) -> Option<&EvaluationRecord> {
        self.evaluations.last()
    }

    /// Evidence produced by one iteration
    pub fn evidence_for(&self, iteration: u32) -> impl Iterator<Item = &Evidence> {
        self.evidence.iter().filter(move |e| e.iteration == iteration)
    }

    /// Fan-out branches of the current iteration still gathering evidence.
    ///
    /// Empty unless the record is running in the investigate stage.
    #[must_use]
    pub fn branches_in_flight(&self) -> Vec<Branch> {
        if self.status != InvestigationStatus::Running || self.current_stage != Stage::Investigate
        {
            return Vec::new();
        }
        [Branch::Metrics, Branch::Logs]
            .into_iter()
            .filter(|branch| {
                !self
                    .evidence_for(self.iteration_count)
                    .any(|e| e.branch == *branch)
            })
            .collect()
    }

    /// Every query executed so far across all iterations, deduplicated.
    #[must_use]
    pub fn queries_attempted(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for evidence in &self.evidence {
            let outcomes: &[QueryOutcome] = match &evidence.outcome {
                EvidenceOutcome::Metrics(m) => m.queries.as_slice(),
                EvidenceOutcome::Logs(l) => l.queries.as_slice(),
                EvidenceOutcome::Failed { .. } => &[],
            };
            for outcome in outcomes {
                if !seen.contains(&outcome.query) {
                    seen.push(outcome.query.clone());
                }
            }
        }
        seen
    }

    /// Record a terminal failure.
    pub fn fail(&mut self, status: InvestigationStatus, error: impl Into<String>) {
        self.status = status;
        self.error = Some(error.into());
        self.pending_input = None;
    }
}
