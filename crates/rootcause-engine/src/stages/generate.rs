//! `generate_rca`: the final report

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use rootcause_store::{
    BranchError, EvidenceOutcome, Investigation, LogExcerpt, RcaReport, RootCause,
};
use rootcause_tools::DashboardRef;
use rootcause_utils::error::StageError;

use super::investigate::MAX_DASHBOARDS;
use super::{StageContext, StageOutput};
use crate::normalize;
use crate::parse::{extract_json, string_field, string_list};
use crate::prompts;
use crate::report::render_markdown;

const STAGE: &str = "generate_rca";

/// Confidence given to a root cause recovered from unstructured output
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

pub(crate) async fn run(
    ctx: &StageContext,
    record: &Investigation,
) -> Result<StageOutput, StageError> {
    let raw = ctx
        .reason(record, STAGE, prompts::report_messages(record))
        .await?;
    let body = parse_report_body(&raw);
    Ok(StageOutput::Reported(Box::new(build_report(record, body))))
}

/// The parts of the report the reasoning service contributes
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ReportBody {
    pub root_causes: Vec<RootCause>,
    pub metrics_summary: Option<String>,
    pub logs_summary: Option<String>,
    pub recommendations: Vec<String>,
}

pub(crate) fn parse_report_body(raw: &str) -> ReportBody {
    let raw = raw.trim();
    if raw.is_empty() {
        return ReportBody::default();
    }

    let structured = extract_json(raw).filter(|object| {
        ["root_causes", "metrics_summary", "logs_summary", "recommendations"]
            .iter()
            .any(|key| object.contains_key(*key))
    });
    let Some(object) = structured else {
        warn!("Report output is not structured; keeping it as an undetermined root cause");
        return ReportBody {
            root_causes: vec![RootCause {
                category: "undetermined".to_string(),
                description: raw.to_string(),
                confidence: FALLBACK_CONFIDENCE,
                evidence: Vec::new(),
            }],
            ..ReportBody::default()
        };
    };

    let root_causes = match object.get("root_causes") {
        Some(Value::Array(items)) => items.iter().filter_map(root_cause).collect(),
        _ => Vec::new(),
    };
    ReportBody {
        root_causes,
        metrics_summary: string_field(&object, "metrics_summary"),
        logs_summary: string_field(&object, "logs_summary"),
        recommendations: string_list(&object, "recommendations"),
    }
}

fn root_cause(item: &Value) -> Option<RootCause> {
    match item {
        Value::String(text) if !text.trim().is_empty() => Some(RootCause {
            category: "other".to_string(),
            description: text.trim().to_string(),
            confidence: FALLBACK_CONFIDENCE,
            evidence: Vec::new(),
        }),
        Value::Object(object) => {
            let description = string_field(object, "description")
                .or_else(|| string_field(object, "cause"))?;
            let confidence = object
                .get("confidence")
                .and_then(Value::as_f64)
                .filter(|c| c.is_finite())
                .map_or(FALLBACK_CONFIDENCE, |c| c.clamp(0.0, 1.0));
            Some(RootCause {
                category: string_field(object, "category").unwrap_or_else(|| "other".to_string()),
                description,
                confidence,
                evidence: string_list(object, "evidence"),
            })
        }
        _ => None,
    }
}

/// Assemble the report from the reasoning body plus the evidence log.
pub(crate) fn build_report(record: &Investigation, body: ReportBody) -> RcaReport {
    let mut metrics_summaries = Vec::new();
    let mut logs_summaries = Vec::new();
    let mut excerpts: Vec<LogExcerpt> = Vec::new();
    let mut dashboards: Vec<DashboardRef> = Vec::new();
    let mut branch_errors = Vec::new();

    for evidence in &record.evidence {
        match &evidence.outcome {
            EvidenceOutcome::Metrics(m) => {
                metrics_summaries.push(m.summary.clone());
                for dashboard in &m.related_dashboards {
                    if !dashboards.iter().any(|d| d.uid == dashboard.uid) {
                        dashboards.push(dashboard.clone());
                    }
                }
            }
            EvidenceOutcome::Logs(l) => {
                logs_summaries.push(l.summary.clone());
                for excerpt in &l.excerpts {
                    if !excerpts
                        .iter()
                        .any(|e| e.timestamp == excerpt.timestamp && e.line == excerpt.line)
                    {
                        excerpts.push(excerpt.clone());
                    }
                }
            }
            EvidenceOutcome::Failed { error, .. } => branch_errors.push(BranchError {
                branch: evidence.branch,
                iteration: evidence.iteration,
                error: error.clone(),
            }),
        }
    }
    normalize::rank_excerpts(&mut excerpts);
    dashboards.truncate(MAX_DASHBOARDS);

    let metrics_summary = body
        .metrics_summary
        .or_else(|| metrics_summaries.pop())
        .unwrap_or_else(|| "No metrics evidence was collected.".to_string());
    let logs_summary = body
        .logs_summary
        .or_else(|| logs_summaries.pop())
        .unwrap_or_else(|| "No log evidence was collected.".to_string());

    let mut report = RcaReport {
        trigger: record.input.trigger(),
        root_causes: body.root_causes,
        metrics_summary,
        logs_summary,
        recommendations: body.recommendations,
        log_excerpts: excerpts,
        related_dashboards: dashboards,
        branch_errors,
        iterations: record.iteration_count,
        forced_by_bound: record.last_evaluation().is_some_and(|e| !e.sufficient),
        markdown: String::new(),
        created_at: Utc::now(),
    };
    report.markdown = render_markdown(&report, record.time_range.as_ref());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rootcause_store::{Branch, Evidence, InvestigationInput, LogsFindings};

    fn record() -> Investigation {
        let mut record = Investigation::new(
            "inv-1",
            InvestigationInput::Query { text: "why".into() },
            2,
            Utc::now() + Duration::minutes(1),
        );
        record.iteration_count = 1;
        record
    }

    #[test]
    fn structured_report_is_read() {
        let raw = r#"```json
{"root_causes": [{"category": "resource", "description": "disk full", "confidence": 1.7, "evidence": ["95% used"]},
                 "memory pressure", {"confidence": 0.2}],
 "metrics_summary": "disk climbing", "recommendations": ["expand volume"]}
```"#;
        let body = parse_report_body(raw);
        assert_eq!(body.root_causes.len(), 2);
        assert_eq!(body.root_causes[0].confidence, 1.0);
        assert_eq!(body.root_causes[0].evidence, vec!["95% used"]);
        assert_eq!(body.root_causes[1].description, "memory pressure");
        assert_eq!(body.metrics_summary.as_deref(), Some("disk climbing"));
        assert_eq!(body.logs_summary, None);
        assert_eq!(body.recommendations, vec!["expand volume"]);
    }

    #[test]
    fn prose_becomes_an_undetermined_cause() {
        let body = parse_report_body("The database ran out of connections.");
        assert_eq!(body.root_causes.len(), 1);
        assert_eq!(body.root_causes[0].category, "undetermined");
        assert_eq!(body.root_causes[0].confidence, FALLBACK_CONFIDENCE);
        assert_eq!(body.root_causes[0].description, "The database ran out of connections.");
    }

    #[test]
    fn empty_output_has_no_causes() {
        assert_eq!(parse_report_body("  \n"), ReportBody::default());
    }

    #[test]
    fn report_carries_branch_errors_and_log_evidence() {
        let mut record = record();
        record.evidence.push(Evidence {
            iteration: 1,
            branch: Branch::Metrics,
            outcome: EvidenceOutcome::Failed {
                error: "metrics query timed out".into(),
                attempts: 2,
            },
            recorded_at: Utc::now(),
        });
        record.evidence.push(Evidence {
            iteration: 1,
            branch: Branch::Logs,
            outcome: EvidenceOutcome::Logs(LogsFindings {
                total_lines: 1,
                excerpts: vec![LogExcerpt {
                    timestamp: Utc::now(),
                    level: "error".into(),
                    line: "db down".into(),
                    labels: Default::default(),
                }],
                summary: "1 error line".into(),
                ..LogsFindings::default()
            }),
            recorded_at: Utc::now(),
        });

        let report = build_report(&record, ReportBody::default());
        assert!(report.root_causes.is_empty());
        assert_eq!(report.branch_errors.len(), 1);
        assert_eq!(report.branch_errors[0].branch, Branch::Metrics);
        assert_eq!(report.logs_summary, "1 error line");
        assert_eq!(report.metrics_summary, "No metrics evidence was collected.");
        assert_eq!(report.log_excerpts.len(), 1);
        assert_eq!(report.iterations, 1);
        assert!(!report.forced_by_bound);
        assert!(report.markdown.contains("## Evidence gaps"));
    }
}
