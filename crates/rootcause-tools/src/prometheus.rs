//! Prometheus HTTP API client (`/api/v1/query_range`)

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use rootcause_config::ResolvedBackend;

use crate::ToolError;
use crate::http::BackendHttp;
use crate::types::{QueryRequest, Series, SeriesPoint};

const QUERY_RANGE_PATH: &str = "/api/v1/query_range";

/// Step used when the request does not set one
pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct PrometheusClient {
    http: BackendHttp,
}

impl PrometheusClient {
    pub fn new(backend: &ResolvedBackend) -> Result<Self, ToolError> {
        Ok(Self {
            http: BackendHttp::new(backend)?,
        })
    }

    pub async fn query_range(&self, request: &QueryRequest) -> Result<Vec<Series>, ToolError> {
        let step = request.step.unwrap_or(DEFAULT_STEP).as_secs().max(1);
        let params = [
            ("query", request.expr.clone()),
            ("start", request.range.start.timestamp().to_string()),
            ("end", request.range.end.timestamp().to_string()),
            ("step", format!("{step}s")),
        ];
        let body: PromResponse = self.http.get_json(QUERY_RANGE_PATH, &params).await?;
        into_series(body, &self.http.kind().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    data: Option<PromData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromData {
    result_type: String,
    #[serde(default)]
    result: Vec<PromSeries>,
}

#[derive(Debug, Deserialize)]
struct PromSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
    /// Instant vectors carry a single `value`
    #[serde(default)]
    value: Option<(f64, String)>,
}

fn into_series(body: PromResponse, backend: &str) -> Result<Vec<Series>, ToolError> {
    if body.status != "success" {
        return Err(ToolError::Decode {
            backend: backend.to_string(),
            message: body
                .error
                .unwrap_or_else(|| format!("status '{}'", body.status)),
        });
    }
    let data = body.data.ok_or_else(|| ToolError::Decode {
        backend: backend.to_string(),
        message: "response has no data".to_string(),
    })?;
    if data.result_type != "matrix" && data.result_type != "vector" {
        return Err(ToolError::Decode {
            backend: backend.to_string(),
            message: format!("unsupported result type '{}'", data.result_type),
        });
    }

    Ok(data
        .result
        .into_iter()
        .map(|raw| {
            let samples = raw.values.into_iter().chain(raw.value);
            Series {
                labels: raw.metric,
                // NaN/Inf samples ("NaN", "+Inf") are dropped
                points: samples
                    .filter_map(|(ts, value)| {
                        let value: f64 = value.parse().ok().filter(|v: &f64| v.is_finite())?;
                        Some(SeriesPoint {
                            timestamp: unix_seconds(ts)?,
                            value,
                        })
                    })
                    .collect(),
            }
        })
        .collect())
}

fn unix_seconds(ts: f64) -> Option<DateTime<Utc>> {
    let secs = ts.trunc() as i64;
    let nanos = ((ts.fract()) * 1e9).round() as u32;
    DateTime::from_timestamp(secs, nanos.min(999_999_999))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matrix() {
        let body: PromResponse = serde_json::from_str(
            r#"{"status":"success","data":{"resultType":"matrix","result":[
                {"metric":{"__name__":"up","job":"api"},
                 "values":[[1714550400,"1"],[1714550460.5,"0"],[1714550520,"NaN"]]}
            ]}}"#,
        )
        .unwrap();
        let series = into_series(body, "metrics").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].labels["job"], "api");
        assert_eq!(series[0].points.len(), 2);
        assert_eq!(series[0].points[1].value, 0.0);
        assert_eq!(series[0].points[0].timestamp.timestamp(), 1_714_550_400);
    }

    #[test]
    fn parses_vector() {
        let body: PromResponse = serde_json::from_str(
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"instance":"db-1"},"value":[1714550400,"42.5"]}
            ]}}"#,
        )
        .unwrap();
        let series = into_series(body, "metrics").unwrap();
        assert_eq!(series[0].points[0].value, 42.5);
    }

    #[test]
    fn error_status_is_decode_error() {
        let body: PromResponse = serde_json::from_str(
            r#"{"status":"error","errorType":"bad_data","error":"parse error at char 5"}"#,
        )
        .unwrap();
        let err = into_series(body, "metrics").unwrap_err();
        assert!(err.to_string().contains("parse error"));
        assert!(!err.is_transient());
    }
}
