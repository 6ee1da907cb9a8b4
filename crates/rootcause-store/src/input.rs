//! Investigation inputs: Alertmanager alerts and free-text questions

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rootcause_tools::parse_timestamp;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    Critical,
    #[default]
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_name: String,
    pub severity: Severity,
    pub instance: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    alerts: Vec<WebhookAlert>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookAlert {
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    starts_at: String,
    #[serde(default)]
    ends_at: String,
}

impl Alert {
    /// Build an alert from an Alertmanager webhook body.
    ///
    /// Only the first alert of a grouped notification is investigated.
    ///
    /// # Errors
    ///
    /// Returns a description when the body is not a webhook payload, carries
    /// no alerts, lacks an `alertname` label, or has an unreadable `startsAt`.
    pub fn from_alertmanager_payload(body: &str) -> Result<Self, String> {
        let payload: WebhookPayload = serde_json::from_str(body)
            .map_err(|e| format!("not an Alertmanager webhook payload: {e}"))?;
        let first = payload
            .alerts
            .into_iter()
            .next()
            .ok_or_else(|| "payload contains no alerts".to_string())?;

        let alert_name = first
            .labels
            .get("alertname")
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .ok_or_else(|| "alert has no alertname label".to_string())?;
        let severity = first
            .labels
            .get("severity")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let starts_at = parse_timestamp(&first.starts_at)?;
        let ends_at = match first.ends_at.trim() {
            "" => None,
            raw => Some(parse_timestamp(raw)?).filter(|t| !is_zero_timestamp(*t)),
        };

        Ok(Self {
            alert_name,
            severity,
            instance: first.labels.get("instance").cloned(),
            summary: first.annotations.get("summary").cloned().unwrap_or_default(),
            description: first
                .annotations
                .get("description")
                .cloned()
                .unwrap_or_default(),
            labels: first.labels,
            annotations: first.annotations,
            starts_at,
            ends_at,
        })
    }

    /// Label values worth searching dashboards and logs for
    #[must_use]
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords = vec![self.alert_name.clone()];
        if let Some(instance) = &self.instance {
            keywords.push(instance.split(':').next().unwrap_or(instance).to_string());
        }
        for key in ["job", "service", "namespace", "pod", "container"] {
            if let Some(value) = self.labels.get(key) {
                keywords.push(value.clone());
            }
        }
        keywords.dedup();
        keywords
    }
}

/// Alertmanager sends `0001-01-01T00:00:00Z` for alerts still firing.
fn is_zero_timestamp(t: DateTime<Utc>) -> bool {
    t.year() <= 1
}

/// What started the investigation. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvestigationInput {
    Alert(Alert),
    /// Raw Alertmanager webhook body, parsed by `analyze_input`
    AlertPayload { body: String },
    Query { text: String },
}

impl InvestigationInput {
    /// Short human label used in listings and report headers
    #[must_use]
    pub fn trigger(&self) -> String {
        match self {
            Self::Alert(alert) => format!("alert {} ({})", alert.alert_name, alert.severity),
            Self::AlertPayload { body } => match Alert::from_alertmanager_payload(body) {
                Ok(alert) => format!("alert {} ({})", alert.alert_name, alert.severity),
                Err(_) => "alert payload".to_string(),
            },
            Self::Query { text } => {
                let text = text.trim();
                let short: String = text.chars().take(80).collect();
                if short.len() < text.len() {
                    format!("query \"{short}...\"")
                } else {
                    format!("query \"{short}\"")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAYLOAD: &str = r#"{
        "version": "4",
        "status": "firing",
        "alerts": [{
            "status": "firing",
            "labels": {"alertname": "HighCPU", "severity": "critical", "instance": "web-1:9100", "job": "node"},
            "annotations": {"summary": "CPU above 90%", "description": "web-1 CPU is high"},
            "startsAt": "2024-05-01T10:00:00Z",
            "endsAt": "0001-01-01T00:00:00Z"
        }, {
            "status": "firing",
            "labels": {"alertname": "Other"},
            "annotations": {},
            "startsAt": "2024-05-01T11:00:00Z"
        }]
    }"#;

    #[test]
    fn parses_first_alert() {
        let alert = Alert::from_alertmanager_payload(PAYLOAD).unwrap();
        assert_eq!(alert.alert_name, "HighCPU");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.instance.as_deref(), Some("web-1:9100"));
        assert_eq!(alert.summary, "CPU above 90%");
        assert_eq!(
            alert.starts_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(alert.ends_at, None);
        assert_eq!(alert.keywords(), vec!["HighCPU", "web-1", "node"]);
    }

    #[test]
    fn rejects_empty_and_nameless_payloads() {
        assert!(Alert::from_alertmanager_payload(r#"{"alerts":[]}"#).is_err());
        assert!(Alert::from_alertmanager_payload("not json").is_err());
        let nameless = r#"{"alerts":[{"labels":{},"startsAt":"2024-05-01T10:00:00Z"}]}"#;
        assert_eq!(
            Alert::from_alertmanager_payload(nameless).unwrap_err(),
            "alert has no alertname label"
        );
    }

    #[test]
    fn unknown_severity_defaults_to_warning() {
        let body = r#"{"alerts":[{"labels":{"alertname":"X","severity":"page"},"startsAt":"2024-05-01T10:00:00Z"}]}"#;
        assert_eq!(
            Alert::from_alertmanager_payload(body).unwrap().severity,
            Severity::Warning
        );
    }

    #[test]
    fn input_serializes_with_kind_tag() {
        let input = InvestigationInput::Query {
            text: "why is checkout slow?".into(),
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["kind"], "query");
        assert_eq!(input.trigger(), "query \"why is checkout slow?\"");
    }
}
