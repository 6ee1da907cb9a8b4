//! `investigate`: the metrics and logs branches, run concurrently.
//!
//! Each branch executes its planned queries through the gateway,
//! normalizes what comes back and appends one evidence entry when it
//! finishes, so evidence lands in completion order. A branch fails only
//! when every one of its queries fails; it is retried once when any of
//! those failures was transient. A failed branch becomes a `Failed`
//! evidence entry and never fails the stage.

use std::fmt::Write as _;
use std::time::Instant;

use chrono::Utc;
use tracing::{Instrument, warn};

use rootcause_store::{
    Branch, Evidence, EvidenceOutcome, Investigation, LogsFindings, MetricsFindings, QueryOutcome,
    QueryPlan, TimeRange,
};
use rootcause_tools::{
    BackendKind, DashboardRef, LogLine, QueryRequest, QueryResult, Series, ToolError,
};
use rootcause_utils::error::StageError;
use rootcause_utils::logging::{log_stage_complete, log_stage_error, log_stage_start, stage_span};
use rootcause_utils::redaction::redact_error_message;

use super::{MAX_STAGE_ATTEMPTS, StageContext, StageOutput, record_failure};
use crate::normalize;
use crate::prompts;

/// Dashboards attached to metrics findings
pub const MAX_DASHBOARDS: usize = 5;
const DASHBOARD_KEYWORDS: usize = 3;

pub(crate) async fn run(
    ctx: &StageContext,
    record: &Investigation,
) -> Result<StageOutput, StageError> {
    let range = record.time_range.ok_or_else(|| StageError::InvalidTransition {
        stage: "investigate".to_string(),
        signal: "no resolved time range".to_string(),
    })?;
    let plan = record.current_plan().cloned().unwrap_or_default();
    let iteration = record.iteration_count;

    // Branches that already reported for this iteration are not re-run.
    let pending = |branch: Branch| !record.evidence_for(iteration).any(|e| e.branch == branch);

    let (metrics, logs) = tokio::join!(
        async {
            if pending(Branch::Metrics) {
                run_branch(ctx, record, Branch::Metrics, &plan, range).await
            } else {
                Ok(())
            }
        },
        async {
            if pending(Branch::Logs) {
                run_branch(ctx, record, Branch::Logs, &plan, range).await
            } else {
                Ok(())
            }
        },
    );
    metrics?;
    logs?;
    Ok(StageOutput::Investigated)
}

async fn run_branch(
    ctx: &StageContext,
    record: &Investigation,
    branch: Branch,
    plan: &QueryPlan,
    range: TimeRange,
) -> Result<(), StageError> {
    let id = record.id.as_str();
    let iteration = record.iteration_count;
    let name = branch.to_string();
    let name = name.as_str();

    async move {
        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            log_stage_start(id, name, attempt);
            let started = Instant::now();
            match collect(ctx, record, branch, plan, range).await {
                Ok(outcome) => {
                    log_stage_complete(id, name, started.elapsed().as_millis());
                    break outcome;
                }
                Err(err) => {
                    let will_retry = err.is_transient() && attempt < MAX_STAGE_ATTEMPTS;
                    log_stage_error(id, name, &err.to_string(), will_retry);
                    record_failure(&ctx.store, id, name, iteration, attempt, &err)?;
                    if !will_retry {
                        break EvidenceOutcome::Failed {
                            error: redact_error_message(&err.to_string()),
                            attempts: attempt,
                        };
                    }
                }
            }
        };

        ctx.store.append_evidence(
            id,
            Evidence {
                iteration,
                branch,
                outcome,
                recorded_at: Utc::now(),
            },
        )?;
        Ok(())
    }
    .instrument(stage_span(id, name, iteration))
    .await
}

/// One attempt at a branch.
async fn collect(
    ctx: &StageContext,
    record: &Investigation,
    branch: Branch,
    plan: &QueryPlan,
    range: TimeRange,
) -> Result<EvidenceOutcome, StageError> {
    let backend = match branch {
        Branch::Metrics => BackendKind::Metrics,
        Branch::Logs => BackendKind::Logs,
    };
    let queries = plan.queries_for(branch);
    let mut outcomes = Vec::with_capacity(queries.len());
    let mut results = Vec::new();
    let mut errors: Vec<ToolError> = Vec::new();

    for query in queries {
        match ctx
            .gateway
            .query(backend, QueryRequest::new(query.clone(), range))
            .await
        {
            Ok(result) => {
                outcomes.push(QueryOutcome {
                    query: query.clone(),
                    result_count: result_count(&result),
                    error: None,
                });
                results.push(result);
            }
            Err(err) => {
                outcomes.push(QueryOutcome {
                    query: query.clone(),
                    result_count: 0,
                    error: Some(redact_error_message(&err.to_string())),
                });
                errors.push(err);
            }
        }
    }

    if !queries.is_empty() && errors.len() == queries.len() {
        let mut reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
        reasons.dedup();
        return Err(StageError::BranchFailed {
            branch: branch.to_string(),
            reason: reasons.join("; "),
            transient: errors.iter().any(ToolError::is_transient),
        });
    }

    let outcome = match branch {
        Branch::Metrics => {
            let series: Vec<Series> = results
                .into_iter()
                .filter_map(|r| match r {
                    QueryResult::Series(s) => Some(s),
                    _ => None,
                })
                .flatten()
                .collect();
            EvidenceOutcome::Metrics(metrics_findings(ctx, record, outcomes, &series, range).await)
        }
        Branch::Logs => {
            let lines: Vec<LogLine> = results
                .into_iter()
                .filter_map(|r| match r {
                    QueryResult::Lines(l) => Some(l),
                    _ => None,
                })
                .flatten()
                .collect();
            EvidenceOutcome::Logs(logs_findings(ctx, record, outcomes, &lines, range).await)
        }
    };
    Ok(outcome)
}

fn result_count(result: &QueryResult) -> usize {
    match result {
        QueryResult::Series(s) => s.len(),
        QueryResult::Lines(l) => l.len(),
        QueryResult::Dashboards(d) => d.len(),
    }
}

async fn metrics_findings(
    ctx: &StageContext,
    record: &Investigation,
    queries: Vec<QueryOutcome>,
    series: &[Series],
    range: TimeRange,
) -> MetricsFindings {
    let (summaries, anomalies) = normalize::summarize_series(series);
    let mut findings = MetricsFindings {
        queries,
        series: summaries,
        anomalies,
        ..MetricsFindings::default()
    };
    if findings.queries.is_empty() {
        findings.notes.push("no metrics queries planned".to_string());
    }

    let (dashboards, note) = related_dashboards(ctx, record, range).await;
    findings.related_dashboards = dashboards;
    findings.notes.extend(note);

    let digest = metrics_digest(&findings);
    let summary =
        summarize(ctx, record, Branch::Metrics, range, &digest, !series.is_empty()).await;
    findings.summary = summary.unwrap_or(digest);
    findings
}

async fn logs_findings(
    ctx: &StageContext,
    record: &Investigation,
    queries: Vec<QueryOutcome>,
    lines: &[LogLine],
    range: TimeRange,
) -> LogsFindings {
    let mut findings = LogsFindings {
        queries,
        total_lines: lines.len(),
        level_counts: normalize::level_counts(lines),
        error_patterns: normalize::error_patterns(lines),
        excerpts: normalize::excerpts(lines),
        ..LogsFindings::default()
    };
    if findings.queries.is_empty() {
        findings.notes.push("no log queries planned".to_string());
    }

    let digest = logs_digest(&findings);
    let summary = summarize(ctx, record, Branch::Logs, range, &digest, !lines.is_empty()).await;
    findings.summary = summary.unwrap_or(digest);
    findings
}

/// Search dashboards by intent keywords. Failures become a note.
async fn related_dashboards(
    ctx: &StageContext,
    record: &Investigation,
    range: TimeRange,
) -> (Vec<DashboardRef>, Option<String>) {
    if !ctx.gateway.supports(BackendKind::Dashboard) {
        return (Vec::new(), None);
    }
    let keywords: Vec<String> = record
        .intent
        .as_ref()
        .map(|i| i.keywords.clone())
        .unwrap_or_default();

    let mut found: Vec<DashboardRef> = Vec::new();
    for keyword in keywords.iter().take(DASHBOARD_KEYWORDS) {
        let request = QueryRequest::new(keyword.clone(), range).with_limit(MAX_DASHBOARDS);
        match ctx.gateway.query(BackendKind::Dashboard, request).await {
            Ok(QueryResult::Dashboards(dashboards)) => {
                for dashboard in dashboards {
                    if !found.iter().any(|d| d.uid == dashboard.uid) {
                        found.push(dashboard);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(investigation_id = %record.id, error = %err, "Dashboard search failed");
                found.truncate(MAX_DASHBOARDS);
                return (
                    found,
                    Some(format!(
                        "dashboard search failed: {}",
                        redact_error_message(&err.to_string())
                    )),
                );
            }
        }
        if found.len() >= MAX_DASHBOARDS {
            break;
        }
    }
    found.truncate(MAX_DASHBOARDS);
    (found, None)
}

/// Prose summary from the reasoning service, or `None` to keep the
/// deterministic digest.
async fn summarize(
    ctx: &StageContext,
    record: &Investigation,
    branch: Branch,
    range: TimeRange,
    digest: &str,
    has_data: bool,
) -> Option<String> {
    if !has_data {
        return None;
    }
    match ctx
        .reason(record, branch.as_ref(), prompts::branch_messages(branch, &range, digest))
        .await
    {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(err) => {
            warn!(investigation_id = %record.id, %branch, error = %err, "Branch summary unavailable; using digest");
            None
        }
    }
}

fn metrics_digest(findings: &MetricsFindings) -> String {
    if findings.series.is_empty() {
        return "No metric data returned for the planned queries.".to_string();
    }
    let mut out = format!(
        "{} series from {} queries, {} anomalous samples.",
        findings.series.len(),
        findings.queries.len(),
        findings.anomalies.len()
    );
    for s in findings.series.iter().take(10) {
        let _ = write!(
            out,
            "\n{}: min {:.3}, max {:.3}, mean {:.3}, last {:.3}",
            s.series, s.min, s.max, s.mean, s.last
        );
    }
    for a in findings.anomalies.iter().take(5) {
        let _ = write!(
            out,
            "\nanomaly {} = {:.3} at {} (z={:.1})",
            a.series,
            a.value,
            a.timestamp.to_rfc3339(),
            a.z_score
        );
    }
    out
}

fn logs_digest(findings: &LogsFindings) -> String {
    if findings.total_lines == 0 {
        return "No log lines returned for the planned queries.".to_string();
    }
    let levels: Vec<String> = findings
        .level_counts
        .iter()
        .map(|(level, count)| format!("{count} {level}"))
        .collect();
    let mut out = format!("{} log lines ({}).", findings.total_lines, levels.join(", "));
    for pattern in findings.error_patterns.iter().take(5) {
        let _ = write!(out, "\n{}x {}", pattern.count, pattern.example);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn digests_describe_empty_results() {
        assert_eq!(
            metrics_digest(&MetricsFindings::default()),
            "No metric data returned for the planned queries."
        );
        assert_eq!(
            logs_digest(&LogsFindings::default()),
            "No log lines returned for the planned queries."
        );
    }

    #[test]
    fn logs_digest_lists_levels_and_patterns() {
        let findings = LogsFindings {
            total_lines: 3,
            level_counts: BTreeMap::from([("error".to_string(), 2), ("info".to_string(), 1)]),
            error_patterns: vec![rootcause_store::ErrorPattern {
                pattern: "db down".into(),
                count: 2,
                example: "db down".into(),
            }],
            ..LogsFindings::default()
        };
        let digest = logs_digest(&findings);
        assert!(digest.starts_with("3 log lines (2 error, 1 info)."));
        assert!(digest.contains("2x db down"));
    }
}
