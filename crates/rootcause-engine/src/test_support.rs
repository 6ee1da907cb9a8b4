//! Scripted collaborators for engine tests.
//!
//! [`ScriptedReasoning`] answers by stage name and [`ScriptedGateway`] by
//! backend, each from a queue of one-shot replies followed by a default.
//! Both record every call and are cheap to clone; clones share state, so
//! a test can keep one handle for assertions after handing the other to
//! the engine.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use rootcause_llm::{Completion, LlmError, ReasoningRequest, ReasoningService};
use rootcause_tools::{
    BackendKind, DashboardRef, LogLine, QueryRequest, QueryResult, Series, SeriesPoint, ToolError,
    ToolGateway,
};

type Reply = Result<String, LlmError>;

#[derive(Default)]
struct ReasoningScript {
    queued: HashMap<String, VecDeque<Reply>>,
    defaults: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    calls: Vec<ReasoningRequest>,
}

/// Reasoning service that replies from a per-stage script.
///
/// A stage with nothing scripted answers `LlmError::Unsupported`, which is
/// not transient, so an unexpected call shows up as a failed stage.
#[derive(Clone, Default)]
pub struct ScriptedReasoning {
    script: Arc<Mutex<ReasoningScript>>,
}

impl ScriptedReasoning {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for `stage`.
    #[must_use]
    pub fn reply(self, stage: &str, reply: Result<&str, LlmError>) -> Self {
        self.lock()
            .queued
            .entry(stage.to_string())
            .or_default()
            .push_back(reply.map(str::to_string));
        self
    }

    /// Answer `text` for `stage` once its queue is empty.
    #[must_use]
    pub fn default_reply(self, stage: &str, text: &str) -> Self {
        self.lock()
            .defaults
            .insert(stage.to_string(), Ok(text.to_string()));
        self
    }

    /// Fail every unqueued call for `stage` with `err`.
    #[must_use]
    pub fn default_error(self, stage: &str, err: LlmError) -> Self {
        self.lock().defaults.insert(stage.to_string(), Err(err));
        self
    }

    /// Sleep before answering calls for `stage`.
    #[must_use]
    pub fn with_delay(self, stage: &str, delay: Duration) -> Self {
        self.lock().delays.insert(stage.to_string(), delay);
        self
    }

    /// Number of calls issued for `stage` so far
    #[must_use]
    pub fn calls_for(&self, stage: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.stage == stage).count()
    }

    /// Every request received, in order
    #[must_use]
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ReasoningScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn complete(&self, request: ReasoningRequest) -> Result<Completion, LlmError> {
        let (reply, delay) = {
            let mut script = self.lock();
            script.calls.push(request.clone());
            let queued = script
                .queued
                .get_mut(&request.stage)
                .and_then(VecDeque::pop_front);
            let reply = queued
                .or_else(|| script.defaults.get(&request.stage).cloned())
                .unwrap_or_else(|| {
                    Err(LlmError::Unsupported(format!(
                        "no scripted reply for stage {}",
                        request.stage
                    )))
                });
            (reply, script.delays.get(&request.stage).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply.map(|text| Completion::new(text, "scripted", "scripted-model"))
    }
}

type Answer = Result<QueryResult, ToolError>;

#[derive(Default)]
struct GatewayScript {
    queued: HashMap<BackendKind, VecDeque<Answer>>,
    defaults: HashMap<BackendKind, Answer>,
    delays: HashMap<BackendKind, Duration>,
    calls: Vec<(BackendKind, QueryRequest)>,
}

/// Tool gateway that answers from a per-backend script.
///
/// A backend is supported once anything is scripted for it; calls to an
/// unscripted backend fail with `ToolError::Unsupported`.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<GatewayScript>>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn result(self, backend: BackendKind, answer: Answer) -> Self {
        self.lock()
            .queued
            .entry(backend)
            .or_default()
            .push_back(answer);
        self
    }

    #[must_use]
    pub fn default_result(self, backend: BackendKind, answer: Answer) -> Self {
        self.lock().defaults.insert(backend, answer);
        self
    }

    /// Sleep before answering calls to `backend`.
    #[must_use]
    pub fn with_delay(self, backend: BackendKind, delay: Duration) -> Self {
        self.lock().delays.insert(backend, delay);
        self
    }

    #[must_use]
    pub fn calls_for(&self, backend: BackendKind) -> usize {
        self.lock().calls.iter().filter(|(b, _)| *b == backend).count()
    }

    /// Query expressions sent to `backend`, in order
    #[must_use]
    pub fn queries_for(&self, backend: BackendKind) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|(b, _)| *b == backend)
            .map(|(_, request)| request.expr.clone())
            .collect()
    }

    /// Time ranges sent to `backend`, in order
    #[must_use]
    pub fn requests_for(&self, backend: BackendKind) -> Vec<QueryRequest> {
        self.lock()
            .calls
            .iter()
            .filter(|(b, _)| *b == backend)
            .map(|(_, request)| request.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, GatewayScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ToolGateway for ScriptedGateway {
    async fn query(
        &self,
        backend: BackendKind,
        request: QueryRequest,
    ) -> Result<QueryResult, ToolError> {
        let (answer, delay) = {
            let mut script = self.lock();
            script.calls.push((backend, request));
            let queued = script.queued.get_mut(&backend).and_then(VecDeque::pop_front);
            let answer = queued
                .or_else(|| script.defaults.get(&backend).cloned())
                .unwrap_or_else(|| {
                    Err(ToolError::Unsupported {
                        backend: backend.to_string(),
                    })
                });
            (answer, script.delays.get(&backend).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }

    fn supports(&self, backend: BackendKind) -> bool {
        let script = self.lock();
        script.defaults.contains_key(&backend) || script.queued.contains_key(&backend)
    }
}

/// A flat request-rate series with one spike
#[must_use]
pub fn sample_series() -> QueryResult {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 50, 0).single().unwrap_or_default();
    let points = (0..20)
        .map(|i| SeriesPoint {
            timestamp: base + chrono::Duration::minutes(i),
            value: if i == 15 { 120.0 } else { 2.0 },
        })
        .collect();
    QueryResult::Series(vec![Series {
        labels: BTreeMap::from([
            ("__name__".to_string(), "http_requests_total".to_string()),
            ("status".to_string(), "500".to_string()),
        ]),
        points,
    }])
}

/// A few API log lines, two of them errors
#[must_use]
pub fn sample_lines() -> QueryResult {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single().unwrap_or_default();
    let line = |secs: i64, text: &str| LogLine {
        timestamp: base + chrono::Duration::seconds(secs),
        labels: BTreeMap::from([("app".to_string(), "api".to_string())]),
        line: text.to_string(),
    };
    QueryResult::Lines(vec![
        line(0, "info: request served in 12ms"),
        line(5, "error: connection refused to db-1:5432"),
        line(9, "error: connection refused to db-1:5432"),
    ])
}

#[must_use]
pub fn sample_dashboards() -> QueryResult {
    QueryResult::Dashboards(vec![DashboardRef {
        uid: "api-overview".to_string(),
        title: "API overview".to_string(),
        url: "/d/api-overview".to_string(),
        tags: vec!["api".to_string()],
    }])
}
