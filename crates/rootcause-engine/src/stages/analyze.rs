//! `analyze_input`: raw alert or question into an [`Intent`]

use chrono::Utc;
use tracing::warn;

use rootcause_store::{Alert, Intent, Investigation, InvestigationInput};
use rootcause_utils::error::StageError;

use super::{StageContext, StageOutput};
use crate::parse::{extract_json, string_field, string_list, time_field};
use crate::prompts;

const STAGE: &str = "analyze_input";

pub(crate) async fn run(
    ctx: &StageContext,
    record: &Investigation,
) -> Result<StageOutput, StageError> {
    let intent = match &record.input {
        InvestigationInput::Alert(alert) => alert_intent(alert.clone()),
        InvestigationInput::AlertPayload { body } => {
            let alert = Alert::from_alertmanager_payload(body).map_err(StageError::InvalidInput)?;
            alert_intent(alert)
        }
        InvestigationInput::Query { text } => {
            if text.trim().is_empty() {
                return Err(StageError::InvalidInput("question is empty".to_string()));
            }
            let raw = ctx
                .reason(record, STAGE, prompts::analyze_messages(text, Utc::now()))
                .await?;
            query_intent(text, &raw)
        }
    };
    Ok(StageOutput::Analyzed(intent))
}

/// Alerts need no reasoning: everything is in the labels.
pub(crate) fn alert_intent(alert: Alert) -> Intent {
    let description = if alert.summary.trim().is_empty() {
        alert.alert_name.clone()
    } else {
        format!("{}: {}", alert.alert_name, alert.summary.trim())
    };
    Intent {
        description,
        target_instances: alert.instance.iter().cloned().collect(),
        time_reference: None,
        requested_start: None,
        requested_end: None,
        keywords: alert.keywords(),
        alert: Some(alert),
        degraded: false,
    }
}

/// Read the analysis JSON, degrading to the question itself.
pub(crate) fn query_intent(question: &str, raw: &str) -> Intent {
    let Some(object) = extract_json(raw) else {
        warn!("Unreadable question analysis; using the raw question as intent");
        return Intent {
            description: question.trim().to_string(),
            degraded: true,
            ..Intent::default()
        };
    };

    let target_instances = string_list(&object, "target_instances");
    let mut keywords = string_list(&object, "keywords");
    if keywords.is_empty() {
        keywords.clone_from(&target_instances);
    }
    let requested_start = time_field(&object, "time_range_start");
    let requested_end = time_field(&object, "time_range_end")
        .filter(|end| requested_start.is_none_or(|start| *end > start));

    Intent {
        description: string_field(&object, "parsed_intent")
            .unwrap_or_else(|| question.trim().to_string()),
        target_instances,
        time_reference: string_field(&object, "time_reference")
            .filter(|t| !t.eq_ignore_ascii_case("null")),
        requested_start,
        requested_end,
        alert: None,
        keywords,
        degraded: false,
    }
}
