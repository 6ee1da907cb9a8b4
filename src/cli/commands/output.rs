//! Human and JSON rendering of command results.
//!
//! JSON goes to stdout pretty-printed with the same field names the
//! boundary API serializes; human output is a short indented summary.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

use rootcause_engine::{RecoverySummary, ReportView, StatusView};

#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    #[must_use]
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn status(&self, view: &StatusView) -> Result<()> {
        if self.json {
            return emit_json(view);
        }
        print!("{}", render_status(view));
        Ok(())
    }

    pub fn list(&self, views: &[StatusView]) -> Result<()> {
        if self.json {
            return emit_json(&views);
        }
        print!("{}", render_list(views));
        Ok(())
    }

    pub fn report(&self, id: &str, view: &ReportView) -> Result<()> {
        if self.json {
            return emit_json(view);
        }
        print!("{}", render_report(id, view));
        Ok(())
    }

    pub fn recovery(&self, summary: &RecoverySummary) -> Result<()> {
        if self.json {
            return emit_json(summary);
        }
        println!(
            "Recovered investigations: {} resumed, {} waiting for input, {} expired",
            summary.resumed, summary.waiting, summary.expired
        );
        Ok(())
    }

    /// Whether stdout is reserved for JSON documents
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.json
    }
}

fn emit_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to emit JSON output")?;
    println!("{text}");
    Ok(())
}

pub fn render_status(view: &StatusView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Investigation {}", view.id);
    let _ = writeln!(out, "  Status: {}", view.status);
    if view.active_branches.is_empty() {
        let _ = writeln!(out, "  Stage: {}", view.current_stage);
    } else {
        let branches: Vec<&str> = view.active_branches.iter().map(AsRef::as_ref).collect();
        let _ = writeln!(
            out,
            "  Stage: {} ({})",
            view.current_stage,
            branches.join(", ")
        );
    }
    let _ = writeln!(
        out,
        "  Iterations: {}/{}",
        view.iteration_count, view.max_iterations
    );
    let _ = writeln!(out, "  Trigger: {}", view.trigger);
    if let Some(prompt) = &view.input_prompt {
        let _ = writeln!(out, "  Needs input: {prompt}");
    }
    if let Some(expires_at) = view.input_expires_at {
        let _ = writeln!(out, "  Input window closes: {}", expires_at.to_rfc3339());
    }
    if let Some(error) = &view.error {
        let _ = writeln!(out, "  Error: {error}");
    }
    let _ = writeln!(out, "  Updated: {}", view.updated_at.to_rfc3339());
    out
}

pub fn render_list(views: &[StatusView]) -> String {
    if views.is_empty() {
        return "No investigations found\n".to_string();
    }
    let mut out = String::new();
    for view in views {
        let _ = writeln!(
            out,
            "{:<22} {:<18} {:<20} {}/{}  {}",
            view.id,
            view.status.as_ref(),
            view.current_stage.as_ref(),
            view.iteration_count,
            view.max_iterations,
            view.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}

pub fn render_report(id: &str, view: &ReportView) -> String {
    match view {
        ReportView::Ready(report) => {
            let mut text = report.markdown.clone();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text
        }
        ReportView::NotYetAvailable { status } => {
            format!("Report for {id} is not yet available (status: {status})\n")
        }
        ReportView::Unavailable { status, error } => {
            format!("Investigation {id} ended {status} without a report: {error}\n")
        }
    }
}
