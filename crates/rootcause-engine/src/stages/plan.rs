//! `plan_investigation`: ask for the next round of queries

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use rootcause_store::{Investigation, QueryPlan, TimeRange};
use rootcause_tools::query_validator::{self, QueryLanguage};
use rootcause_utils::error::StageError;

use super::{StageContext, StageOutput};
use crate::parse::{extract_json, string_field, string_list, time_field};
use crate::prompts;

const STAGE: &str = "plan_investigation";

pub(crate) async fn run(
    ctx: &StageContext,
    record: &Investigation,
) -> Result<StageOutput, StageError> {
    let iteration = record.iteration_count + 1;
    let raw = ctx
        .reason(record, STAGE, prompts::plan_messages(record, iteration, Utc::now()))
        .await?;
    let plan = parse_plan(&raw, iteration).map_err(|reason| StageError::MalformedOutput {
        stage: STAGE.to_string(),
        reason,
    })?;
    debug!(
        investigation_id = %record.id,
        iteration,
        metrics = plan.metrics_queries.len(),
        logs = plan.logs_queries.len(),
        rejected = plan.rejected.len(),
        "Plan accepted"
    );
    Ok(StageOutput::Planned(plan))
}

/// Read a plan object and validate every generated query.
///
/// Accepts `promql_queries`/`logql_queries` as well as
/// `metrics_queries`/`logs_queries`.
pub(crate) fn parse_plan(raw: &str, iteration: u32) -> Result<QueryPlan, String> {
    let object = extract_json(raw).ok_or_else(|| "no JSON object in plan output".to_string())?;

    let mut plan = QueryPlan {
        iteration,
        target_instances: string_list(&object, "target_instances"),
        signals: string_list(&object, "signals"),
        rationale: string_field(&object, "rationale").unwrap_or_default(),
        ..QueryPlan::default()
    };

    let candidates = [
        (QueryLanguage::PromQl, ["promql_queries", "metrics_queries"]),
        (QueryLanguage::LogQl, ["logql_queries", "logs_queries"]),
    ];
    for (language, keys) in candidates {
        for query in keys.iter().flat_map(|key| string_list(&object, key)) {
            match query_validator::validate(&query, language) {
                Ok(valid) => {
                    let target = match language {
                        QueryLanguage::PromQl => &mut plan.metrics_queries,
                        QueryLanguage::LogQl => &mut plan.logs_queries,
                    };
                    if !target.contains(&valid.query) {
                        target.push(valid.query);
                    }
                }
                Err(rejected) => {
                    warn!(query = %rejected.query, reasons = ?rejected.reasons, "Generated query rejected");
                    plan.rejected.push(rejected);
                }
            }
        }
    }

    if let Some(Value::Object(range)) = object.get("time_range") {
        if let (Some(start), Some(end)) = (time_field(range, "start"), time_field(range, "end")) {
            plan.proposed_range = TimeRange::new(start, end).ok();
        }
    }

    Ok(plan)
}
