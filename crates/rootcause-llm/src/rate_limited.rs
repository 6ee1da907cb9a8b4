//! Rate-limit aware wrapper for reasoning backends
//!
//! Bounds concurrent in-flight calls with a semaphore and retries calls the
//! provider rejected with a quota error, backing off exponentially between
//! `min_wait` and `max_wait`. Every other error is returned untouched so the
//! engine's own retry-once policy stays the only general retry.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use rootcause_config::Config;

use crate::LlmError;
use crate::types::{Completion, ReasoningRequest, ReasoningService};

pub struct RateLimitedService {
    inner: Arc<dyn ReasoningService>,
    permits: Arc<Semaphore>,
    retries: u32,
    min_wait: Duration,
    max_wait: Duration,
    quota_hits: AtomicU32,
}

impl RateLimitedService {
    pub fn new(
        inner: Arc<dyn ReasoningService>,
        max_concurrency: usize,
        retries: u32,
        min_wait: Duration,
        max_wait: Duration,
    ) -> Self {
        debug!(
            max_concurrency,
            retries,
            min_wait_ms = min_wait.as_millis() as u64,
            max_wait_ms = max_wait.as_millis() as u64,
            "Creating RateLimitedService"
        );
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            retries,
            min_wait,
            max_wait: max_wait.max(min_wait),
            quota_hits: AtomicU32::new(0),
        }
    }

    pub fn from_config(inner: Arc<dyn ReasoningService>, config: &Config) -> Self {
        Self::new(
            inner,
            config.llm.max_concurrency(),
            config.llm.rate_limit_retries(),
            config.llm.rate_limit_min_wait(),
            config.llm.rate_limit_max_wait(),
        )
    }

    /// Number of quota rejections observed so far
    pub fn quota_hits(&self) -> u32 {
        self.quota_hits.load(Ordering::SeqCst)
    }

    /// Wait before retry number `attempt` (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .clamp(self.min_wait, self.max_wait)
    }
}

#[async_trait]
impl ReasoningService for RateLimitedService {
    async fn complete(&self, request: ReasoningRequest) -> Result<Completion, LlmError> {
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| LlmError::Transport("reasoning limiter closed".to_string()))?;
                self.inner.complete(request.clone()).await
            };

            match result {
                Err(LlmError::ProviderQuota(message)) => {
                    self.quota_hits.fetch_add(1, Ordering::SeqCst);
                    if attempt >= self.retries {
                        warn!(
                            stage = %request.stage,
                            attempts = attempt + 1,
                            "Provider quota still exhausted, giving up"
                        );
                        return Err(LlmError::ProviderQuota(message));
                    }
                    attempt += 1;
                    let wait = self.backoff(attempt);
                    warn!(
                        stage = %request.stage,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Provider quota exceeded, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }
}
