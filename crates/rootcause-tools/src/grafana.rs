//! Grafana dashboard search (`/api/search`)

use serde::Deserialize;

use rootcause_config::ResolvedBackend;

use crate::ToolError;
use crate::http::BackendHttp;
use crate::types::{DashboardRef, QueryRequest};

const SEARCH_PATH: &str = "/api/search";

pub const DEFAULT_LIMIT: usize = 5;

#[derive(Clone)]
pub struct GrafanaClient {
    http: BackendHttp,
}

impl GrafanaClient {
    pub fn new(backend: &ResolvedBackend) -> Result<Self, ToolError> {
        Ok(Self {
            http: BackendHttp::new(backend)?,
        })
    }

    /// Search dashboards whose title matches `request.expr`.
    pub async fn search(&self, request: &QueryRequest) -> Result<Vec<DashboardRef>, ToolError> {
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);
        let params = [
            ("query", request.expr.clone()),
            ("type", "dash-db".to_string()),
            ("limit", limit.to_string()),
        ];
        let hits: Vec<SearchHit> = self.http.get_json(SEARCH_PATH, &params).await?;
        Ok(into_dashboards(hits, limit))
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "type", default)]
    kind: String,
}

fn into_dashboards(hits: Vec<SearchHit>, limit: usize) -> Vec<DashboardRef> {
    hits.into_iter()
        .filter(|hit| hit.kind.is_empty() || hit.kind == "dash-db")
        .filter(|hit| !hit.uid.is_empty())
        .take(limit)
        .map(|hit| DashboardRef {
            uid: hit.uid,
            title: hit.title,
            url: hit.url,
            tags: hit.tags,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folders_are_skipped_and_limit_applies() {
        let hits: Vec<SearchHit> = serde_json::from_str(
            r#"[
                {"uid":"f1","title":"Infra","type":"dash-folder"},
                {"uid":"d1","title":"Node Exporter","url":"/d/d1","type":"dash-db","tags":["node"]},
                {"uid":"d2","title":"API latency","url":"/d/d2","type":"dash-db"},
                {"uid":"d3","title":"API errors","url":"/d/d3","type":"dash-db"}
            ]"#,
        )
        .unwrap();
        let dashboards = into_dashboards(hits, 2);
        assert_eq!(dashboards.len(), 2);
        assert_eq!(dashboards[0].uid, "d1");
        assert_eq!(dashboards[0].tags, vec!["node".to_string()]);
    }
}
