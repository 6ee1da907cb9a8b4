//! Markdown rendering of the final report

use std::fmt::Write as _;

use rootcause_store::{RcaReport, TimeRange};

use crate::sanitizer::escape_markdown;

/// Render `report` as Markdown. All model- and backend-derived text is
/// escaped.
#[must_use]
pub fn render_markdown(report: &RcaReport, window: Option<&TimeRange>) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Root cause analysis: {}\n", escape_markdown(&report.trigger));
    if let Some(window) = window {
        let _ = writeln!(md, "Window: {window}  ");
    }
    let _ = writeln!(
        md,
        "Iterations: {}{}\n",
        report.iterations,
        if report.forced_by_bound {
            " (iteration limit reached)"
        } else {
            ""
        }
    );

    md.push_str("## Root causes\n\n");
    if report.root_causes.is_empty() {
        md.push_str("No root cause could be determined from the collected evidence.\n\n");
    }
    for (i, cause) in report.root_causes.iter().enumerate() {
        let _ = writeln!(
            md,
            "{}. **{}** ({:.0}% confidence): {}",
            i + 1,
            escape_markdown(&cause.category),
            cause.confidence * 100.0,
            escape_markdown(&cause.description)
        );
        for evidence in &cause.evidence {
            let _ = writeln!(md, "   - {}", escape_markdown(evidence));
        }
    }
    if !report.root_causes.is_empty() {
        md.push('\n');
    }

    let _ = writeln!(md, "## Metrics\n\n{}\n", escape_markdown(&report.metrics_summary));
    let _ = writeln!(md, "## Logs\n\n{}\n", escape_markdown(&report.logs_summary));

    if !report.recommendations.is_empty() {
        md.push_str("## Recommendations\n\n");
        for rec in &report.recommendations {
            let _ = writeln!(md, "- {}", escape_markdown(rec));
        }
        md.push('\n');
    }

    if !report.log_excerpts.is_empty() {
        md.push_str("## Log excerpts\n\n```text\n");
        for excerpt in &report.log_excerpts {
            let _ = writeln!(
                md,
                "{} [{}] {}",
                excerpt.timestamp.to_rfc3339(),
                excerpt.level,
                escape_markdown(&excerpt.line).replace("```", "'''")
            );
        }
        md.push_str("```\n\n");
    }

    if !report.related_dashboards.is_empty() {
        md.push_str("## Related dashboards\n\n");
        for dashboard in &report.related_dashboards {
            let _ = writeln!(
                md,
                "- [{}]({})",
                escape_markdown(&dashboard.title),
                escape_markdown(&dashboard.url)
            );
        }
        md.push('\n');
    }

    if !report.branch_errors.is_empty() {
        md.push_str("## Evidence gaps\n\n");
        for err in &report.branch_errors {
            let _ = writeln!(
                md,
                "- {} (round {}): {}",
                err.branch,
                err.iteration,
                escape_markdown(&err.error)
            );
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rootcause_store::{Branch, BranchError, RootCause};

    fn report() -> RcaReport {
        RcaReport {
            trigger: "alert HighCPU (critical)".into(),
            root_causes: vec![RootCause {
                category: "resource".into(),
                description: "CPU saturation <!-- hidden -->".into(),
                confidence: 0.8,
                evidence: vec!["cpu at 98%".into()],
            }],
            metrics_summary: "cpu high".into(),
            logs_summary: "<script>x</script>".into(),
            recommendations: vec!["scale out".into()],
            log_excerpts: vec![],
            related_dashboards: vec![],
            branch_errors: vec![BranchError {
                branch: Branch::Metrics,
                iteration: 1,
                error: "timed out".into(),
            }],
            iterations: 2,
            forced_by_bound: true,
            markdown: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn renders_sections_and_escapes() {
        let md = render_markdown(&report(), None);
        assert!(md.starts_with("# Root cause analysis: alert HighCPU (critical)"));
        assert!(md.contains("Iterations: 2 (iteration limit reached)"));
        assert!(md.contains("1. **resource** (80% confidence): CPU saturation &lt;!-- hidden --&gt;"));
        assert!(md.contains("&lt;script>x&lt;/script>"));
        assert!(md.contains("- investigate_metrics (round 1): timed out"));
        assert!(!md.contains("<!--"));
    }

    #[test]
    fn empty_report_says_so() {
        let mut r = report();
        r.root_causes.clear();
        let md = render_markdown(&r, None);
        assert!(md.contains("No root cause could be determined"));
    }
}
