use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

use rootcause_config::{BackendKind, Config};

use crate::ToolError;
use crate::types::{QueryRequest, QueryResult, ToolGateway};

/// Bounds in-flight calls per backend across every investigation.
///
/// Waiting for a permit does not count against the call's timeout; the
/// timeout starts once the inner gateway sends the request.
pub struct ConcurrencyLimitedGateway<G> {
    inner: G,
    permits: HashMap<BackendKind, Arc<Semaphore>>,
}

impl<G: ToolGateway> ConcurrencyLimitedGateway<G> {
    pub fn new(inner: G, limits: impl IntoIterator<Item = (BackendKind, usize)>) -> Self {
        let permits = limits
            .into_iter()
            .map(|(kind, limit)| (kind, Arc::new(Semaphore::new(limit.max(1)))))
            .collect();
        Self { inner, permits }
    }

    pub fn from_config(inner: G, config: &Config) -> Self {
        Self::new(
            inner,
            BackendKind::ALL.map(|kind| (kind, config.backends.resolve(kind).max_concurrency)),
        )
    }

    /// Permits currently free for `backend`
    pub fn available(&self, backend: BackendKind) -> Option<usize> {
        self.permits.get(&backend).map(|s| s.available_permits())
    }
}

#[async_trait]
impl<G: ToolGateway> ToolGateway for ConcurrencyLimitedGateway<G> {
    async fn query(
        &self,
        backend: BackendKind,
        request: QueryRequest,
    ) -> Result<QueryResult, ToolError> {
        let _permit = match self.permits.get(&backend) {
            Some(semaphore) => Some(semaphore.acquire().await.map_err(|_| {
                ToolError::Transport {
                    backend: backend.to_string(),
                    message: "concurrency limiter closed".to_string(),
                }
            })?),
            None => None,
        };
        trace!(backend = %backend, "Acquired backend permit");
        self.inner.query(backend, request).await
    }

    fn supports(&self, backend: BackendKind) -> bool {
        self.inner.supports(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeRange;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowGateway {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ToolGateway for SlowGateway {
        async fn query(
            &self,
            _backend: BackendKind,
            _request: QueryRequest,
        ) -> Result<QueryResult, ToolError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(QueryResult::Series(Vec::new()))
        }

        fn supports(&self, _backend: BackendKind) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn limits_parallel_calls_per_backend() {
        let inner = Arc::new(SlowGateway::default());
        let gateway = Arc::new(ConcurrencyLimitedGateway::new(
            inner.clone(),
            [(BackendKind::Metrics, 2)],
        ));
        let range = TimeRange::ending_at(Utc::now(), Duration::from_secs(300));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                gateway
                    .query(BackendKind::Metrics, QueryRequest::new("up", range))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(inner.peak.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.available(BackendKind::Metrics), Some(2));
        assert_eq!(gateway.available(BackendKind::Logs), None);
    }
}
