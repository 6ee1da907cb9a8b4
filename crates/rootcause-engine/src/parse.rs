//! Structured reads of free-form reasoning output

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use rootcause_store::EvaluationFeedback;
use rootcause_tools::parse_timestamp;

/// Characters of an unreadable verdict kept as feedback reasoning
pub const MAX_MALFORMED_REASONING: usize = 2000;

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("static regex compiles"));
static ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z_]*\s*(.*?)```").expect("static regex compiles"));

/// Pull the first JSON object out of model output.
///
/// Tries a ```` ```json ```` fence, then any fence, then the outermost
/// `{ ... }` span of the raw text.
#[must_use]
pub fn extract_json(text: &str) -> Option<Map<String, Value>> {
    let fenced = JSON_FENCE
        .captures_iter(text)
        .chain(ANY_FENCE.captures_iter(text))
        .filter_map(|c| c.get(1).map(|m| m.as_str()));
    for candidate in fenced {
        if let Some(object) = parse_object(candidate) {
            return Some(object);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Outcome of reading an evaluation response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub sufficient: bool,
    /// No recognizable verdict; treated as insufficient
    pub malformed: bool,
    pub feedback: Option<EvaluationFeedback>,
}

/// Read a sufficiency verdict.
///
/// The expected shape is `SUFFICIENT` or `INSUFFICIENT` on the first line,
/// optionally followed by a JSON feedback object. A JSON object carrying
/// `"sufficient": bool` or `"verdict": "..."` is accepted as well. Anything
/// else is an insufficient, malformed verdict.
#[must_use]
pub fn parse_verdict(text: &str) -> Verdict {
    let first_line = text
        .lines()
        .map(|l| l.trim().trim_matches(|c: char| matches!(c, '*' | '#' | '`' | '"' | ':')))
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_ascii_uppercase();

    if first_line.starts_with("INSUFFICIENT") {
        return Verdict {
            sufficient: false,
            malformed: false,
            feedback: Some(feedback_from(text, &first_line)),
        };
    }
    if first_line.starts_with("SUFFICIENT") {
        return Verdict {
            sufficient: true,
            malformed: false,
            feedback: None,
        };
    }

    if let Some(object) = extract_json(text) {
        let flag = match (object.get("sufficient"), object.get("verdict")) {
            (Some(Value::Bool(b)), _) => Some(*b),
            (_, Some(Value::String(v))) => match v.trim().to_ascii_uppercase().as_str() {
                "SUFFICIENT" => Some(true),
                "INSUFFICIENT" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if let Some(sufficient) = flag {
            return Verdict {
                sufficient,
                malformed: false,
                feedback: (!sufficient).then(|| feedback_from_object(&object)),
            };
        }
    }

    // Keep what the evaluator said so the next plan can still use it.
    let trimmed = text.trim();
    let reasoning = if trimmed.is_empty() {
        "verdict missing; treated as insufficient".to_string()
    } else {
        trimmed.chars().take(MAX_MALFORMED_REASONING).collect()
    };
    Verdict {
        sufficient: false,
        malformed: true,
        feedback: Some(EvaluationFeedback {
            reasoning,
            ..EvaluationFeedback::default()
        }),
    }
}

fn feedback_from(text: &str, first_line: &str) -> EvaluationFeedback {
    if let Some(object) = extract_json(text) {
        return feedback_from_object(&object);
    }
    // Plain prose after the verdict line becomes the reasoning.
    let rest: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .skip(1)
        .collect();
    let reasoning = if rest.is_empty() {
        first_line
            .trim_start_matches("INSUFFICIENT")
            .trim_start_matches([':', '-', ' '])
            .to_string()
    } else {
        rest.join(" ")
    };
    EvaluationFeedback {
        reasoning,
        ..EvaluationFeedback::default()
    }
}

fn feedback_from_object(object: &Map<String, Value>) -> EvaluationFeedback {
    EvaluationFeedback {
        missing_information: string_list(object, "missing_information"),
        additional_investigation_points: string_list(object, "additional_investigation_points"),
        previous_queries_attempted: string_list(object, "previous_queries_attempted"),
        reasoning: string_field(object, "reasoning").unwrap_or_default(),
    }
}

/// A list of strings under `key`; a lone string counts as a one-item list.
#[must_use]
pub fn string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
    match object.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[must_use]
pub fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Timestamp under `key`, accepting RFC 3339 or a naive ISO form read as UTC.
#[must_use]
pub fn time_field(object: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    string_field(object, key).and_then(|raw| parse_lenient_timestamp(&raw))
}

#[must_use]
pub fn parse_lenient_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = parse_timestamp(raw) {
        return Some(t);
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn json_is_found_in_fences_and_prose() {
        let fenced = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json(fenced).unwrap()["a"], 1);

        let bare_fence = "```\n{\"b\": true}\n```";
        assert_eq!(extract_json(bare_fence).unwrap()["b"], true);

        let prose = "The plan is {\"c\": \"x\"} as requested.";
        assert_eq!(extract_json(prose).unwrap()["c"], "x");

        assert!(extract_json("no json here").is_none());
        assert!(extract_json("} backwards {").is_none());
    }

    #[test]
    fn json_fence_wins_over_earlier_braces() {
        let text = "ignore {this}\n```json\n{\"d\": 2}\n```";
        assert_eq!(extract_json(text).unwrap()["d"], 2);
    }

    #[test]
    fn sufficient_verdict() {
        let verdict = parse_verdict("SUFFICIENT\nThe evidence explains the alert.");
        assert!(verdict.sufficient);
        assert!(!verdict.malformed);
        assert!(verdict.feedback.is_none());
    }

    #[test]
    fn insufficient_verdict_with_json_feedback() {
        let text = r#"INSUFFICIENT
```json
{"missing_information": ["disk metrics"], "additional_investigation_points": ["check node-2"], "reasoning": "no disk data"}
```"#;
        let verdict = parse_verdict(text);
        assert!(!verdict.sufficient);
        assert!(!verdict.malformed);
        let feedback = verdict.feedback.unwrap();
        assert_eq!(feedback.missing_information, vec!["disk metrics"]);
        assert_eq!(feedback.additional_investigation_points, vec!["check node-2"]);
        assert_eq!(feedback.reasoning, "no disk data");
    }

    #[test]
    fn insufficient_verdict_with_prose_keeps_reasoning() {
        let verdict = parse_verdict("**INSUFFICIENT**\nNeed logs from the database.");
        assert!(!verdict.sufficient);
        assert_eq!(verdict.feedback.unwrap().reasoning, "Need logs from the database.");
    }

    #[test]
    fn lowercase_verdict_is_accepted() {
        assert!(parse_verdict("sufficient").sufficient);
    }

    #[test]
    fn structured_verdict_is_accepted() {
        let verdict = parse_verdict(r#"{"sufficient": false, "reasoning": "thin"}"#);
        assert!(!verdict.sufficient);
        assert!(!verdict.malformed);
        assert_eq!(verdict.feedback.unwrap().reasoning, "thin");

        assert!(parse_verdict(r#"{"verdict": "SUFFICIENT"}"#).sufficient);
    }

    #[test]
    fn garbage_is_malformed_and_insufficient() {
        for text in ["", "   ", "maybe?", "NOT SUFFICIENT", "{\"other\": 1}"] {
            let verdict = parse_verdict(text);
            assert!(!verdict.sufficient, "{text:?}");
            assert!(verdict.malformed, "{text:?}");
        }
    }

    #[test]
    fn unreadable_verdict_keeps_the_evaluator_text() {
        let verdict =
            parse_verdict("  The evidence looks thin; we need db connection pool metrics\n");
        assert!(verdict.malformed);
        assert_eq!(
            verdict.feedback.unwrap().reasoning,
            "The evidence looks thin; we need db connection pool metrics"
        );

        let long = "é".repeat(MAX_MALFORMED_REASONING + 50);
        let reasoning = parse_verdict(&long).feedback.unwrap().reasoning;
        assert_eq!(reasoning.chars().count(), MAX_MALFORMED_REASONING);

        let empty = parse_verdict("").feedback.unwrap().reasoning;
        assert!(empty.contains("missing"));
    }

    #[test]
    fn string_lists_accept_single_strings() {
        let object = extract_json(r#"{"a": ["x", "", 3], "b": "y", "c": 1}"#).unwrap();
        assert_eq!(string_list(&object, "a"), vec!["x", "3"]);
        assert_eq!(string_list(&object, "b"), vec!["y"]);
        assert!(string_list(&object, "c").is_empty());
        assert!(string_list(&object, "missing").is_empty());
    }

    #[test]
    fn lenient_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_lenient_timestamp("2024-05-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_lenient_timestamp("2024-05-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_lenient_timestamp("2024-05-01T10:00:00"), Some(expected));
        assert_eq!(parse_lenient_timestamp("2024-05-01 10:00:00"), Some(expected));
        assert_eq!(parse_lenient_timestamp("yesterday"), None);
    }

    proptest! {
        #[test]
        fn malformed_verdicts_are_never_sufficient(text in "\\PC{0,200}") {
            let verdict = parse_verdict(&text);
            prop_assert!(!(verdict.malformed && verdict.sufficient));
            prop_assert_eq!(verdict.feedback.is_some(), !verdict.sufficient);
        }

        #[test]
        fn extract_json_never_panics(text in ".{0,200}") {
            let _ = extract_json(&text);
        }
    }
}
