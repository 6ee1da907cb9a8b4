//! Loki HTTP API client (`/loki/api/v1/query_range`)

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use rootcause_config::ResolvedBackend;

use crate::ToolError;
use crate::http::BackendHttp;
use crate::types::{LogLine, QueryRequest};

const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";

pub const DEFAULT_LIMIT: usize = 100;

#[derive(Clone)]
pub struct LokiClient {
    http: BackendHttp,
}

impl LokiClient {
    pub fn new(backend: &ResolvedBackend) -> Result<Self, ToolError> {
        Ok(Self {
            http: BackendHttp::new(backend)?,
        })
    }

    /// Newest lines first, at most `request.limit` of them.
    pub async fn query_range(&self, request: &QueryRequest) -> Result<Vec<LogLine>, ToolError> {
        let params = [
            ("query", request.expr.clone()),
            ("start", nanos(request.range.start)),
            ("end", nanos(request.range.end)),
            ("limit", request.limit.unwrap_or(DEFAULT_LIMIT).to_string()),
            ("direction", "backward".to_string()),
        ];
        let body: LokiResponse = self.http.get_json(QUERY_RANGE_PATH, &params).await?;
        into_lines(body, &self.http.kind().to_string())
    }
}

fn nanos(t: DateTime<Utc>) -> String {
    t.timestamp_nanos_opt()
        .map_or_else(|| format!("{}000000000", t.timestamp()), |n| n.to_string())
}

#[derive(Debug, Deserialize)]
struct LokiResponse {
    status: String,
    #[serde(default)]
    data: Option<LokiData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LokiData {
    result_type: String,
    #[serde(default)]
    result: Vec<LokiStream>,
}

#[derive(Debug, Deserialize)]
struct LokiStream {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(String, String)>,
}

fn into_lines(body: LokiResponse, backend: &str) -> Result<Vec<LogLine>, ToolError> {
    if body.status != "success" {
        return Err(ToolError::Decode {
            backend: backend.to_string(),
            message: format!("status '{}'", body.status),
        });
    }
    let Some(data) = body.data else {
        return Ok(Vec::new());
    };
    if data.result_type != "streams" {
        return Err(ToolError::Decode {
            backend: backend.to_string(),
            message: format!(
                "expected a log query, got result type '{}' (metric queries belong to the metrics backend)",
                data.result_type
            ),
        });
    }

    let mut lines: Vec<LogLine> = data
        .result
        .into_iter()
        .flat_map(|stream| {
            let labels = stream.stream;
            stream.values.into_iter().filter_map(move |(ts, line)| {
                let ns: i64 = ts.parse().ok()?;
                Some(LogLine {
                    timestamp: DateTime::from_timestamp_nanos(ns),
                    labels: labels.clone(),
                    line,
                })
            })
        })
        .collect();
    lines.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(lines)
}
