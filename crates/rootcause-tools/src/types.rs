use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rootcause_config::BackendKind;

use crate::ToolError;

/// Closed time interval used to bound evidence queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// # Errors
    ///
    /// Returns a description when `end` is not after `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if end <= start {
            return Err(format!(
                "time range end {} must be after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            ));
        }
        Ok(Self { start, end })
    }

    /// `[at - before, at + after]`
    #[must_use]
    pub fn around(at: DateTime<Utc>, before: Duration, after: Duration) -> Self {
        Self {
            start: at - to_chrono(before),
            end: at + to_chrono(after),
        }
    }

    /// `[end - window, end]`
    #[must_use]
    pub fn ending_at(end: DateTime<Utc>, window: Duration) -> Self {
        Self {
            start: end - to_chrono(window),
            end,
        }
    }

    /// `[start, start + window]`
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>, window: Duration) -> Self {
        Self {
            start,
            end: start + to_chrono(window),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }

    /// Parse `START/END` or `START,END` where both halves are RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn parse_pair(text: &str) -> Result<Self, String> {
        let (start, end) = text
            .split_once('/')
            .or_else(|| text.split_once(','))
            .ok_or_else(|| "expected START/END".to_string())?;
        let start = parse_timestamp(start.trim())?;
        let end = parse_timestamp(end.trim())?;
        Self::new(start, end)
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Parse an RFC 3339 timestamp into UTC.
///
/// # Errors
///
/// Returns a description when the text is not RFC 3339.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("'{text}' is not an RFC 3339 timestamp: {e}"))
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

/// One call to a query backend.
///
/// `expr` is PromQL for metrics, LogQL for logs and a keyword string for
/// the dashboard search.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub expr: String,
    pub range: TimeRange,
    /// Resolution step for range queries; backend default when `None`
    pub step: Option<Duration>,
    /// Maximum number of entries to return; backend default when `None`
    pub limit: Option<usize>,
}

impl QueryRequest {
    pub fn new(expr: impl Into<String>, range: TimeRange) -> Self {
        Self {
            expr: expr.into(),
            range,
            step: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = Some(step);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One labelled time series from the metrics backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    /// `__name__{k="v",...}` rendering used in findings and prompts
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = self.labels.get("__name__").map_or("", String::as_str);
        let matchers: Vec<String> = self
            .labels
            .iter()
            .filter(|(k, _)| k.as_str() != "__name__")
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect();
        if matchers.is_empty() {
            name.to_string()
        } else {
            format!("{name}{{{}}}", matchers.join(","))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub labels: BTreeMap<String, String>,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRef {
    pub uid: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Backend-native result shapes, normalized later by stage executors.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Series(Vec<Series>),
    Lines(Vec<LogLine>),
    Dashboards(Vec<DashboardRef>),
}

impl QueryResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Series(s) => s.is_empty(),
            Self::Lines(l) => l.is_empty(),
            Self::Dashboards(d) => d.is_empty(),
        }
    }
}

/// Uniform interface to the read-only query backends.
///
/// Each call is bounded by the backend's timeout and attempted exactly
/// once; retrying is the caller's decision.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn query(&self, backend: BackendKind, request: QueryRequest)
    -> Result<QueryResult, ToolError>;

    /// Whether `backend` is configured and enabled
    fn supports(&self, backend: BackendKind) -> bool;
}

#[async_trait]
impl<T: ToolGateway + ?Sized> ToolGateway for Arc<T> {
    async fn query(
        &self,
        backend: BackendKind,
        request: QueryRequest,
    ) -> Result<QueryResult, ToolError> {
        (**self).query(backend, request).await
    }

    fn supports(&self, backend: BackendKind) -> bool {
        (**self).supports(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn around_alert_time() {
        let range = TimeRange::around(
            at(10, 0),
            Duration::from_secs(15 * 60),
            Duration::from_secs(5 * 60),
        );
        assert_eq!(range.start, at(9, 45));
        assert_eq!(range.end, at(10, 5));
        assert_eq!(range.duration(), Duration::from_secs(20 * 60));
    }

    #[test]
    fn new_rejects_inverted_range() {
        assert!(TimeRange::new(at(10, 0), at(9, 0)).is_err());
        assert!(TimeRange::new(at(10, 0), at(10, 0)).is_err());
        assert!(TimeRange::new(at(9, 0), at(10, 0)).is_ok());
    }

    #[test]
    fn parse_pair_accepts_slash_and_comma() {
        let slash = TimeRange::parse_pair("2024-05-01T09:00:00Z/2024-05-01T10:00:00Z").unwrap();
        let comma =
            TimeRange::parse_pair("2024-05-01T09:00:00Z, 2024-05-01T10:00:00+00:00").unwrap();
        assert_eq!(slash, comma);
        assert_eq!(slash.start, at(9, 0));
    }

    #[test]
    fn parse_pair_rejects_garbage() {
        assert!(TimeRange::parse_pair("yesterday").is_err());
        assert!(TimeRange::parse_pair("2024-05-01T09:00:00Z/soon").is_err());
    }

    #[test]
    fn series_display_name() {
        let mut labels = BTreeMap::new();
        labels.insert("__name__".to_string(), "up".to_string());
        labels.insert("job".to_string(), "api".to_string());
        let series = Series {
            labels,
            points: vec![],
        };
        assert_eq!(series.display_name(), "up{job=\"api\"}");
    }
}
