//! Logging and observability infrastructure for rootcause
//!
//! Every stage of an investigation runs inside a [`stage_span`] so that log
//! lines carry the investigation id, stage name and iteration number. Error
//! text is redacted before it is emitted.

use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact_error_message;

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("rootcause=debug,info")
            } else {
                EnvFilter::try_new("rootcause=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the tracing subscriber for human-readable output.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` selects between
/// `rootcause=debug,info` and `rootcause=info,warn`. Verbose mode also
/// reports span close events so stage durations appear in the log.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let layer = fmt::layer()
        .with_target(verbose)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_writer(std::io::stderr);

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter(true))
            .with(layer.with_span_events(FmtSpan::CLOSE).compact())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter(false))
            .with(layer.compact())
            .try_init()?;
    }

    Ok(())
}

/// Initialize the tracing subscriber with JSON lines on stderr.
pub fn init_tracing_json(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}

/// Create a span for one stage execution.
pub fn stage_span(investigation_id: &str, stage: &str, iteration: u32) -> tracing::Span {
    span!(
        Level::INFO,
        "stage",
        investigation_id = %investigation_id,
        stage = %stage,
        iteration = iteration,
    )
}

pub fn log_stage_start(investigation_id: &str, stage: &str, attempt: u32) {
    info!(
        investigation_id = %investigation_id,
        stage = %stage,
        attempt = attempt,
        "Starting stage"
    );
}

pub fn log_stage_complete(investigation_id: &str, stage: &str, duration_ms: u128) {
    info!(
        investigation_id = %investigation_id,
        stage = %stage,
        duration_ms = %duration_ms,
        "Stage completed"
    );
}

/// Log a stage failure. Transient failures that will be retried log at `warn`.
pub fn log_stage_error(investigation_id: &str, stage: &str, error: &str, will_retry: bool) {
    let sanitized = redact_error_message(error);
    if will_retry {
        warn!(
            investigation_id = %investigation_id,
            stage = %stage,
            error = %sanitized,
            "Stage attempt failed, retrying"
        );
    } else {
        error!(
            investigation_id = %investigation_id,
            stage = %stage,
            error = %sanitized,
            "Stage failed"
        );
    }
}

/// Log the terminal (or suspended) outcome of a run.
pub fn log_investigation_outcome(investigation_id: &str, status: &str, iterations: u32) {
    info!(
        investigation_id = %investigation_id,
        status = %status,
        iterations = iterations,
        "Investigation run settled"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_and_helpers_work_without_subscriber() {
        let span = stage_span("inv-1", "plan_investigation", 1);
        let _guard = span.enter();
        log_stage_start("inv-1", "plan_investigation", 1);
        log_stage_error("inv-1", "plan_investigation", "timeout", true);
        log_stage_complete("inv-1", "plan_investigation", 12);
        log_investigation_outcome("inv-1", "completed", 1);
    }

    #[test]
    fn second_init_reports_error_instead_of_panicking() {
        let first = init_tracing(false);
        let second = init_tracing(true);
        // Only one global subscriber can exist; whichever call lost must fail cleanly.
        assert!(first.is_err() || second.is_err());
    }
}
