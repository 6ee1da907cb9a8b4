//! Shared fixtures for the integration tests.
//!
//! Every test drives investigations through `InvestigationService`, the
//! same surface the CLI uses, with scripted reasoning and backends.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use rootcause::{
    Alert, EngineSettings, InvestigationInput, InvestigationService, InvestigationStore,
    StatusView,
};
use rootcause_engine::test_support::{
    ScriptedGateway, ScriptedReasoning, sample_lines, sample_series,
};
use rootcause_tools::BackendKind;

pub const POLL: Duration = Duration::from_millis(5);

pub const PLAN: &str = r#"{"promql_queries": ["sum(rate(http_requests_total{status=\"500\"}[5m]))"], "logql_queries": ["{app=\"api\"} |= \"error\""], "rationale": "error rate and error logs"}"#;

pub const RCA: &str = r#"{"root_causes": [{"category": "dependency", "description": "database db-1 refused connections", "confidence": 0.8, "evidence": ["connection refused to db-1:5432"]}], "recommendations": ["restore db-1"]}"#;

/// 2024-05-01T10:00:00Z, the firing time of [`alert_input`]
pub fn alert_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn settings(max_iterations: u32) -> EngineSettings {
    EngineSettings {
        max_iterations,
        investigation_timeout: Duration::from_secs(30),
        suspension_timeout: Duration::from_secs(30),
        reasoning_timeout: Duration::from_secs(5),
        ..EngineSettings::default()
    }
}

/// Reasoning that plans, reports and judges the first round sufficient.
pub fn reasoning() -> ScriptedReasoning {
    ScriptedReasoning::new()
        .default_reply(
            "analyze_input",
            r#"{"parsed_intent": "API returns 500s", "target_instances": ["api-1"]}"#,
        )
        .default_reply("plan_investigation", PLAN)
        .default_reply("evaluate_results", "SUFFICIENT\nThe log errors explain the spike.")
        .default_reply("generate_rca", RCA)
}

/// Metrics and logs answering with the sample data
pub fn gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .default_result(BackendKind::Metrics, Ok(sample_series()))
        .default_result(BackendKind::Logs, Ok(sample_lines()))
}

pub fn service(
    reasoning: ScriptedReasoning,
    gateway: ScriptedGateway,
    settings: EngineSettings,
) -> InvestigationService {
    service_with_store(
        reasoning,
        gateway,
        settings,
        Arc::new(InvestigationStore::in_memory()),
    )
}

pub fn service_with_store(
    reasoning: ScriptedReasoning,
    gateway: ScriptedGateway,
    settings: EngineSettings,
    store: Arc<InvestigationStore>,
) -> InvestigationService {
    InvestigationService::new(Arc::new(reasoning), Arc::new(gateway), store, settings)
}

pub fn query(text: &str) -> InvestigationInput {
    InvestigationInput::Query { text: text.into() }
}

/// A firing `HighErrorRate` alert as Alertmanager delivers it
pub fn alert_payload() -> String {
    r#"{
        "receiver": "rootcause",
        "status": "firing",
        "alerts": [{
            "status": "firing",
            "labels": {"alertname": "HighErrorRate", "instance": "api-1:8080", "job": "api", "severity": "critical"},
            "annotations": {"summary": "5xx ratio above 5%", "description": "api-1 is failing requests"},
            "startsAt": "2024-05-01T10:00:00Z",
            "endsAt": "0001-01-01T00:00:00Z"
        }]
    }"#
    .to_string()
}

pub fn alert_input() -> InvestigationInput {
    InvestigationInput::Alert(Alert::from_alertmanager_payload(&alert_payload()).unwrap())
}

pub async fn settle(service: &InvestigationService, id: &str) -> StatusView {
    tokio::time::timeout(Duration::from_secs(10), service.wait_for_settled(id, POLL))
        .await
        .expect("investigation settles within ten seconds")
        .unwrap()
}
