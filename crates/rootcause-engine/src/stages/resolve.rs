//! `resolve_time_range`: pick the evidence window or ask a human for one

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use rootcause_store::{Investigation, SuppliedInput, TimeRange, TimeRangeSource};
use rootcause_utils::error::StageError;

use super::{StageContext, StageOutput};
use crate::parse::{extract_json, time_field};
use crate::prompts;
use crate::settings::EngineSettings;

const STAGE: &str = "resolve_time_range";

pub(crate) const INPUT_PROMPT: &str = "No time range could be determined for this investigation. \
Supply START/END in RFC 3339 (e.g. 2024-05-01T10:00:00Z/2024-05-01T11:00:00Z) or describe the time, \
e.g. \"between 9 and 10 this morning\".";

pub(crate) async fn run(
    ctx: &StageContext,
    record: &Investigation,
) -> Result<StageOutput, StageError> {
    if let Some(supplied) = &record.supplied_input {
        let range = match supplied {
            SuppliedInput::Range(range) => *range,
            SuppliedInput::Text(text) => convert_text(ctx, record, text).await,
        };
        info!(investigation_id = %record.id, %range, "Using supplied time range");
        return Ok(StageOutput::Resolved {
            range,
            source: Some(TimeRangeSource::Supplied),
        });
    }

    Ok(match resolve_without_input(record, &ctx.settings) {
        Some((range, source)) => StageOutput::Resolved { range, source },
        None => StageOutput::NeedsInput {
            prompt: INPUT_PROMPT.to_string(),
        },
    })
}

/// Deterministic precedence when nobody supplied a range.
///
/// A range resolved earlier is kept as-is (`source` is `None`).
pub(crate) fn resolve_without_input(
    record: &Investigation,
    settings: &EngineSettings,
) -> Option<(TimeRange, Option<TimeRangeSource>)> {
    if let Some(range) = record.time_range {
        return Some((range, None));
    }

    let intent = record.intent.as_ref();
    if let Some(alert) = intent.and_then(|i| i.alert.as_ref()) {
        let range = TimeRange::around(alert.starts_at, settings.alert_lookback, settings.alert_lookahead);
        return Some((range, Some(TimeRangeSource::AlertWindow)));
    }

    if let Some(start) = intent.and_then(|i| i.requested_start) {
        let range = match intent.and_then(|i| i.requested_end) {
            Some(end) => TimeRange::new(start, end).ok(),
            None => Some(TimeRange::starting_at(start, settings.default_query_window)),
        };
        if let Some(range) = range {
            return Some((range, Some(TimeRangeSource::QueryBounds)));
        }
    }

    record
        .current_plan()
        .and_then(|plan| plan.proposed_range)
        .map(|range| (range, Some(TimeRangeSource::Plan)))
}

/// Free-text time description into a range; falls back to the default
/// window ending now.
async fn convert_text(ctx: &StageContext, record: &Investigation, text: &str) -> TimeRange {
    let now = Utc::now();
    let fallback = TimeRange::ending_at(now, ctx.settings.default_query_window);
    match ctx.reason(record, STAGE, prompts::time_messages(text, now)).await {
        Ok(raw) => range_from_output(&raw).unwrap_or_else(|| {
            warn!(investigation_id = %record.id, "Could not read converted time range; using default window");
            fallback
        }),
        Err(err) => {
            warn!(investigation_id = %record.id, error = %err, "Time conversion failed; using default window");
            fallback
        }
    }
}

pub(crate) fn range_from_output(raw: &str) -> Option<TimeRange> {
    let object = extract_json(raw)?;
    let start: DateTime<Utc> = time_field(&object, "start")?;
    let end = time_field(&object, "end")?;
    TimeRange::new(start, end).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rootcause_store::{Alert, InvestigationInput, QueryPlan, Severity};
    use std::collections::BTreeMap;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn query_record() -> Investigation {
        let mut record = Investigation::new(
            "inv-1",
            InvestigationInput::Query { text: "why".into() },
            3,
            Utc::now() + Duration::minutes(2),
        );
        record.intent = Some(rootcause_store::Intent::default());
        record
    }

    fn alert(starts_at: DateTime<Utc>) -> Alert {
        Alert {
            alert_name: "HighCPU".into(),
            severity: Severity::Critical,
            instance: None,
            summary: String::new(),
            description: String::new(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            starts_at,
            ends_at: None,
        }
    }

    #[test]
    fn alert_window_is_fifteen_back_five_ahead() {
        let mut record = query_record();
        record.intent.as_mut().unwrap().alert = Some(alert(at(10, 0)));
        let (range, source) = resolve_without_input(&record, &EngineSettings::default()).unwrap();
        assert_eq!(range.start, at(9, 45));
        assert_eq!(range.end, at(10, 5));
        assert_eq!(source, Some(TimeRangeSource::AlertWindow));
    }

    #[test]
    fn query_start_gets_the_default_window() {
        let mut record = query_record();
        record.intent.as_mut().unwrap().requested_start = Some(at(10, 0));
        let (range, source) = resolve_without_input(&record, &EngineSettings::default()).unwrap();
        assert_eq!(range.end, at(11, 0));
        assert_eq!(source, Some(TimeRangeSource::QueryBounds));
    }

    #[test]
    fn plan_range_is_the_last_resort() {
        let mut record = query_record();
        assert!(resolve_without_input(&record, &EngineSettings::default()).is_none());
        let proposed = TimeRange::new(at(8, 0), at(9, 0)).unwrap();
        record.plans.push(QueryPlan {
            iteration: 1,
            proposed_range: Some(proposed),
            ..QueryPlan::default()
        });
        let (range, source) = resolve_without_input(&record, &EngineSettings::default()).unwrap();
        assert_eq!(range, proposed);
        assert_eq!(source, Some(TimeRangeSource::Plan));
    }

    #[test]
    fn resolved_range_is_kept() {
        let mut record = query_record();
        let existing = TimeRange::new(at(1, 0), at(2, 0)).unwrap();
        record.time_range = Some(existing);
        record.intent.as_mut().unwrap().alert = Some(alert(at(10, 0)));
        let (range, source) = resolve_without_input(&record, &EngineSettings::default()).unwrap();
        assert_eq!(range, existing);
        assert_eq!(source, None);
    }

    #[test]
    fn converted_output_is_read() {
        let range =
            range_from_output(r#"{"start": "2024-05-01T09:00:00Z", "end": "2024-05-01T10:00:00Z"}"#)
                .unwrap();
        assert_eq!(range.start, at(9, 0));
        assert!(range_from_output(r#"{"start": null, "end": null}"#).is_none());
    }
}
