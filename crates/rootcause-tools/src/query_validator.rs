//! Pre-flight checks for generated PromQL and LogQL
//!
//! Generated queries commonly drift toward SQL, carry dashboard template
//! variables, or embed time bounds that belong in the request parameters.
//! `validate` repairs what it safely can and rejects the rest with reasons.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Substitution for dashboard interval variables
pub const INTERVAL_SUBSTITUTE: &str = "5m";

const INTERVAL_VARIABLES: &[&str] = &["$__rate_interval", "$__interval", "$__range"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    PromQl,
    LogQl,
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PromQl => write!(f, "PromQL"),
            Self::LogQl => write!(f, "LogQL"),
        }
    }
}

/// A query that passed validation, possibly after repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    pub query: String,
    /// Repairs applied on the way
    pub warnings: Vec<String>,
}

/// A query that cannot be executed, with every reason found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedQuery {
    pub query: String,
    pub language: QueryLanguage,
    pub reasons: Vec<String>,
}

static SQL_KEYWORDS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bSELECT\b", "SELECT"),
        (r"(?i)\bFROM\b", "FROM"),
        (r"(?i)\bWHERE\b", "WHERE"),
        // lowercase `and`/`or` are PromQL set operators
        (r"\bAND\b", "AND"),
        (r"\bOR\b", "OR"),
        (r#"[<>]=\s*'"#, "quoted comparison"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).expect("static regex compiles"), name))
    .collect()
});

static INLINE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(@?timestamp|log_time)\s*[<>=]|\d{4}-\d{2}-\d{2}T\d{2}:\d{2}")
        .expect("static regex compiles")
});

static TEMPLATE_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{?[A-Za-z_][A-Za-z0-9_]*\}?").expect("static regex compiles"));

static SINGLE_QUOTED_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*\s*(?:=~|!~|!=|=))\s*'([^']*)'")
        .expect("static regex compiles")
});

static LABEL_MATCHER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[A-Za-z_][A-Za-z0-9_]*\s*(=~|!~|!=|=)\s*"(?:[^"\\]|\\.)*"$"#)
        .expect("static regex compiles")
});

static PROMQL_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_:(\{0-9\-]").expect("static regex compiles"));

/// Validate and repair one query.
///
/// # Errors
///
/// Returns `RejectedQuery` listing every problem when the query cannot be
/// used as-is or after repair.
pub fn validate(query: &str, language: QueryLanguage) -> Result<ValidatedQuery, RejectedQuery> {
    let (repaired, warnings) = sanitize(query);
    let mut reasons = Vec::new();

    if repaired.is_empty() {
        reasons.push("query is empty".to_string());
        return Err(RejectedQuery {
            query: query.to_string(),
            language,
            reasons,
        });
    }

    let unquoted = strip_quoted(&repaired);

    for (pattern, name) in SQL_KEYWORDS.iter() {
        if pattern.is_match(&unquoted) {
            reasons.push(format!("SQL syntax '{name}' is not valid {language}"));
        }
    }

    if INLINE_TIME.is_match(&repaired) {
        reasons.push(
            "time bounds belong in the request range, not inside the query".to_string(),
        );
    }

    if let Some(var) = TEMPLATE_VARIABLE.find(&unquoted) {
        reasons.push(format!("unresolved template variable '{}'", var.as_str()));
    }

    for (open, close) in [('(', ')'), ('{', '}'), ('[', ']')] {
        let opens = unquoted.matches(open).count();
        let closes = unquoted.matches(close).count();
        if opens != closes {
            reasons.push(format!("unbalanced '{open}{close}' ({opens} vs {closes})"));
        }
    }

    match language {
        QueryLanguage::PromQl => {
            if !PROMQL_START.is_match(&repaired) {
                reasons.push("PromQL must start with a metric, function or selector".to_string());
            }
        }
        QueryLanguage::LogQl => {
            if !repaired.starts_with('{') && !starts_with_range_aggregation(&repaired) {
                reasons.push(
                    "LogQL must start with a stream selector such as {job=\"api\"}".to_string(),
                );
            }
        }
    }

    if let Some(selector) = first_selector(&repaired) {
        let matchers = split_matchers(selector);
        if matchers.is_empty() && language == QueryLanguage::LogQl {
            reasons.push("stream selector needs at least one label matcher".to_string());
        }
        for matcher in matchers {
            if !LABEL_MATCHER.is_match(matcher) {
                reasons.push(format!("invalid label matcher '{matcher}'"));
            }
        }
    } else if language == QueryLanguage::LogQl && reasons.is_empty() {
        reasons.push("stream selector is missing".to_string());
    }

    if reasons.is_empty() {
        Ok(ValidatedQuery {
            query: repaired,
            warnings,
        })
    } else {
        Err(RejectedQuery {
            query: query.to_string(),
            language,
            reasons,
        })
    }
}

/// Mechanical repairs that never change query meaning.
fn sanitize(query: &str) -> (String, Vec<String>) {
    let mut warnings = Vec::new();
    let mut repaired = query.trim().trim_matches('`').trim().to_string();

    if repaired.contains("{{") || repaired.contains("}}") {
        while repaired.contains("{{") || repaired.contains("}}") {
            repaired = repaired.replace("{{", "{").replace("}}", "}");
        }
        warnings.push("collapsed doubled braces".to_string());
    }

    for var in INTERVAL_VARIABLES {
        if repaired.contains(var) {
            repaired = repaired.replace(var, INTERVAL_SUBSTITUTE);
            warnings.push(format!("replaced {var} with {INTERVAL_SUBSTITUTE}"));
        }
    }

    if SINGLE_QUOTED_VALUE.is_match(&repaired) {
        repaired = SINGLE_QUOTED_VALUE
            .replace_all(&repaired, "$1\"$2\"")
            .into_owned();
        warnings.push("converted single-quoted label values to double quotes".to_string());
    }

    (repaired, warnings)
}

/// Blank out the contents of double-quoted strings.
fn strip_quoted(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in query.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push('"');
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}

/// Contents of the first `{...}` selector, quote-aware.
fn first_selector(query: &str) -> Option<&str> {
    let start = query.find('{')?;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in query[start + 1..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '}' => return Some(&query[start + 1..start + 1 + offset]),
            _ => {}
        }
    }
    None
}

/// Split selector contents on commas outside quoted values.
fn split_matchers(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut begin = 0;
    for (i, c) in selector.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => {
                parts.push(selector[begin..i].trim());
                begin = i + 1;
            }
            _ => {}
        }
    }
    parts.push(selector[begin..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// `count_over_time({...}[5m])` style metric queries over logs
fn starts_with_range_aggregation(query: &str) -> bool {
    let head = query.split('(').next().unwrap_or_default().trim();
    let head = head.split_whitespace().next().unwrap_or_default();
    matches!(
        head,
        "rate"
            | "count_over_time"
            | "bytes_over_time"
            | "bytes_rate"
            | "sum"
            | "avg"
            | "max"
            | "min"
            | "topk"
            | "bottomk"
            | "absent_over_time"
    ) && query.contains('{')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_common_promql() {
        for query in [
            "up",
            "rate(http_requests_total{status=~\"5..\"}[5m])",
            "100 - (avg by (instance) (rate(node_cpu_seconds_total{mode=\"idle\"}[5m])) * 100)",
            "histogram_quantile(0.99, rate(http_request_duration_seconds_bucket[5m]))",
            "up == 0 and on(instance) node_load1 > 4",
        ] {
            let validated = validate(query, QueryLanguage::PromQl).unwrap();
            assert_eq!(validated.query, query);
            assert!(validated.warnings.is_empty());
        }
    }

    #[test]
    fn rejects_sql() {
        let rejected = validate(
            "SELECT * FROM logs WHERE level = 'error'",
            QueryLanguage::LogQl,
        )
        .unwrap_err();
        assert!(rejected.reasons.iter().any(|r| r.contains("SELECT")));
        assert!(rejected.reasons.iter().any(|r| r.contains("stream selector")));
    }

    #[test]
    fn rejects_uppercase_and_between_matchers() {
        let rejected = validate(
            "{pod_name=\"api\" AND namespace=\"prod\"}",
            QueryLanguage::LogQl,
        )
        .unwrap_err();
        assert!(rejected.reasons.iter().any(|r| r.contains("'AND'")));
    }

    #[test]
    fn keywords_inside_strings_are_ignored() {
        assert!(validate("{app=\"api\"} |= \"SELECT FROM users\"", QueryLanguage::LogQl).is_ok());
    }

    #[test]
    fn rejects_inline_timestamps() {
        let rejected = validate(
            "{app=\"api\"} |= \"2024-05-01T10:00\"",
            QueryLanguage::LogQl,
        )
        .unwrap_err();
        assert!(rejected.reasons[0].contains("time bounds"));
    }

    #[test]
    fn collapses_double_braces() {
        let validated = validate("{{job=\"varlogs\"}} |= \"error\"", QueryLanguage::LogQl).unwrap();
        assert_eq!(validated.query, "{job=\"varlogs\"} |= \"error\"");
        assert_eq!(validated.warnings.len(), 1);
    }

    #[test]
    fn substitutes_interval_variables() {
        let validated = validate(
            "rate(http_requests_total[$__rate_interval])",
            QueryLanguage::PromQl,
        )
        .unwrap();
        assert_eq!(validated.query, "rate(http_requests_total[5m])");
    }

    #[test]
    fn rejects_other_template_variables() {
        // quoted label values are opaque to the check
        assert!(validate("up{instance=~\"$node\"}", QueryLanguage::PromQl).is_ok());
        let rejected = validate("rate(up[$window])", QueryLanguage::PromQl).unwrap_err();
        assert!(rejected.reasons.iter().any(|r| r.contains("$window")));
    }

    #[test]
    fn repairs_single_quotes() {
        let validated = validate("{job='api'}", QueryLanguage::LogQl).unwrap();
        assert_eq!(validated.query, "{job=\"api\"}");
    }

    #[test]
    fn rejects_empty_selector_and_unbalanced() {
        assert!(validate("{}", QueryLanguage::LogQl).is_err());
        let rejected = validate("rate(up[5m]", QueryLanguage::PromQl).unwrap_err();
        assert!(rejected.reasons.iter().any(|r| r.contains("unbalanced")));
    }

    #[test]
    fn accepts_logql_metric_queries() {
        assert!(validate("count_over_time({app=\"api\"} |= \"error\" [5m])", QueryLanguage::LogQl).is_ok());
    }

    #[test]
    fn matcher_values_may_contain_commas() {
        assert!(validate("{app=~\"api,web\", env=\"prod\"}", QueryLanguage::LogQl).is_ok());
    }

    proptest! {
        #[test]
        fn validate_never_panics(query in ".{0,80}") {
            let _ = validate(&query, QueryLanguage::PromQl);
            let _ = validate(&query, QueryLanguage::LogQl);
        }
    }
}
