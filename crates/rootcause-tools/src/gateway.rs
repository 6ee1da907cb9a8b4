use async_trait::async_trait;
use tracing::{debug, info};

use rootcause_config::{BackendKind, Config};

use crate::ToolError;
use crate::grafana::GrafanaClient;
use crate::loki::LokiClient;
use crate::prometheus::PrometheusClient;
use crate::types::{QueryRequest, QueryResult, ToolGateway};

/// Gateway over the configured Prometheus, Loki and Grafana endpoints.
///
/// Disabled backends answer with `ToolError::Unsupported`.
#[derive(Clone, Default)]
pub struct HttpToolGateway {
    metrics: Option<PrometheusClient>,
    logs: Option<LokiClient>,
    dashboard: Option<GrafanaClient>,
}

impl HttpToolGateway {
    /// # Errors
    ///
    /// Returns `ToolError::Transport` if an enabled backend has an unusable URL.
    pub fn from_config(config: &Config) -> Result<Self, ToolError> {
        let mut gateway = Self::default();
        for kind in BackendKind::ALL {
            let backend = config.backends.resolve(kind);
            if !backend.enabled {
                debug!(backend = %kind, "Backend disabled");
                continue;
            }
            match kind {
                BackendKind::Metrics => gateway.metrics = Some(PrometheusClient::new(&backend)?),
                BackendKind::Logs => gateway.logs = Some(LokiClient::new(&backend)?),
                BackendKind::Dashboard => gateway.dashboard = Some(GrafanaClient::new(&backend)?),
            }
            info!(backend = %kind, url = %backend.url, "Backend configured");
        }
        Ok(gateway)
    }
}

#[async_trait]
impl ToolGateway for HttpToolGateway {
    async fn query(
        &self,
        backend: BackendKind,
        request: QueryRequest,
    ) -> Result<QueryResult, ToolError> {
        let unsupported = || ToolError::Unsupported {
            backend: backend.to_string(),
        };
        match backend {
            BackendKind::Metrics => {
                let client = self.metrics.as_ref().ok_or_else(unsupported)?;
                client.query_range(&request).await.map(QueryResult::Series)
            }
            BackendKind::Logs => {
                let client = self.logs.as_ref().ok_or_else(unsupported)?;
                client.query_range(&request).await.map(QueryResult::Lines)
            }
            BackendKind::Dashboard => {
                let client = self.dashboard.as_ref().ok_or_else(unsupported)?;
                client.search(&request).await.map(QueryResult::Dashboards)
            }
        }
    }

    fn supports(&self, backend: BackendKind) -> bool {
        match backend {
            BackendKind::Metrics => self.metrics.is_some(),
            BackendKind::Logs => self.logs.is_some(),
            BackendKind::Dashboard => self.dashboard.is_some(),
        }
    }
}
