//! Backend results into findings: series statistics, anomalies, log
//! levels, error patterns and excerpts.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use rootcause_store::{Anomaly, ErrorPattern, LogExcerpt, SeriesSummary};
use rootcause_tools::{LogLine, Series};

/// Samples further than this many standard deviations from the mean
pub const ANOMALY_Z_SCORE: f64 = 3.0;
pub const MAX_ERROR_PATTERNS: usize = 10;
pub const MAX_LOG_EXCERPTS: usize = 20;

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("static regex compiles")
});
static HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(0x[0-9a-f]+|[0-9a-f]*\d[0-9a-f]*[a-f][0-9a-f]*|[0-9a-f]*[a-f][0-9a-f]*\d[0-9a-f]*)\b")
        .expect("static regex compiles")
});
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex compiles"));
static LEVEL_WORDS: Lazy<[(Regex, &'static str); 4]> = Lazy::new(|| {
    [
        (r"(?i)\b(fatal|panic|critical|crit|error|err|exception|failed|failure)\b", "error"),
        (r"(?i)\b(warn|warning)\b", "warn"),
        (r"(?i)\b(info|notice)\b", "info"),
        (r"(?i)\b(debug|trace)\b", "debug"),
    ]
    .map(|(pattern, level)| (Regex::new(pattern).expect("static regex compiles"), level))
});

/// Per-series statistics plus the samples that stand out.
#[must_use]
pub fn summarize_series(series: &[Series]) -> (Vec<SeriesSummary>, Vec<Anomaly>) {
    let mut summaries = Vec::new();
    let mut anomalies = Vec::new();

    for s in series {
        let values: Vec<f64> = s.points.iter().map(|p| p.value).filter(|v| v.is_finite()).collect();
        let Some(&last) = values.last() else {
            continue;
        };
        let name = s.display_name();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std_dev = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

        if std_dev > 0.0 {
            for point in s.points.iter().filter(|p| p.value.is_finite()) {
                let z_score = (point.value - mean) / std_dev;
                if z_score.abs() > ANOMALY_Z_SCORE {
                    anomalies.push(Anomaly {
                        series: name.clone(),
                        timestamp: point.timestamp,
                        value: point.value,
                        z_score,
                    });
                }
            }
        }

        summaries.push(SeriesSummary {
            series: name,
            samples: values.len(),
            min,
            max,
            mean,
            last,
        });
    }

    (summaries, anomalies)
}

/// Severity of a log line: the `level` label when present, else keywords.
#[must_use]
pub fn classify_level(line: &LogLine) -> &'static str {
    let labelled = ["level", "detected_level", "severity", "lvl"]
        .iter()
        .find_map(|key| line.labels.get(*key));
    if let Some(level) = labelled {
        if let Some(normalized) = normalize_level_word(level) {
            return normalized;
        }
    }
    LEVEL_WORDS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&line.line))
        .map_or("unknown", |(_, level)| level)
}

fn normalize_level_word(word: &str) -> Option<&'static str> {
    match word.trim().to_ascii_lowercase().as_str() {
        "fatal" | "panic" | "critical" | "crit" | "error" | "err" | "emerg" | "alert" => {
            Some("error")
        }
        "warn" | "warning" => Some("warn"),
        "info" | "notice" | "information" => Some("info"),
        "debug" | "trace" => Some("debug"),
        _ => None,
    }
}

/// Collapse variable parts (ids, hex, numbers) so repeats group together.
#[must_use]
pub fn error_signature(line: &str) -> String {
    let masked = UUID.replace_all(line.trim(), "<id>");
    let masked = HEX.replace_all(&masked, "<hex>");
    let masked = NUMBER.replace_all(&masked, "<n>");
    masked.chars().take(200).collect()
}

/// Count lines per level.
#[must_use]
pub fn level_counts(lines: &[LogLine]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for line in lines {
        *counts.entry(classify_level(line).to_string()).or_insert(0) += 1;
    }
    counts
}

/// The most frequent error signatures, most common first.
#[must_use]
pub fn error_patterns(lines: &[LogLine]) -> Vec<ErrorPattern> {
    let mut grouped: HashMap<String, ErrorPattern> = HashMap::new();
    for line in lines.iter().filter(|l| classify_level(l) == "error") {
        grouped
            .entry(error_signature(&line.line))
            .and_modify(|p| p.count += 1)
            .or_insert_with_key(|pattern| ErrorPattern {
                pattern: pattern.clone(),
                count: 1,
                example: line.line.clone(),
            });
    }
    let mut patterns: Vec<ErrorPattern> = grouped.into_values().collect();
    patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pattern.cmp(&b.pattern)));
    patterns.truncate(MAX_ERROR_PATTERNS);
    patterns
}

/// Representative lines: errors first, then warnings, newest first within a level.
#[must_use]
pub fn excerpts(lines: &[LogLine]) -> Vec<LogExcerpt> {
    let mut excerpts: Vec<LogExcerpt> = lines
        .iter()
        .map(|line| LogExcerpt {
            timestamp: line.timestamp,
            level: classify_level(line).to_string(),
            line: line.line.clone(),
            labels: line.labels.clone(),
        })
        .collect();
    rank_excerpts(&mut excerpts);
    excerpts
}

/// Order excerpts by severity then recency, keeping at most [`MAX_LOG_EXCERPTS`].
pub fn rank_excerpts(excerpts: &mut Vec<LogExcerpt>) {
    excerpts.sort_by(|a, b| {
        level_rank(&a.level)
            .cmp(&level_rank(&b.level))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    excerpts.truncate(MAX_LOG_EXCERPTS);
}

fn level_rank(level: &str) -> u8 {
    match level {
        "error" => 0,
        "warn" => 1,
        "info" => 2,
        "unknown" => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rootcause_tools::SeriesPoint;

    fn line(secs: i64, text: &str) -> LogLine {
        LogLine {
            timestamp: Utc.timestamp_opt(1_714_557_600 + secs, 0).unwrap(),
            labels: BTreeMap::new(),
            line: text.to_string(),
        }
    }

    fn series(values: &[f64]) -> Series {
        Series {
            labels: BTreeMap::from([("__name__".to_string(), "cpu".to_string())]),
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint {
                    timestamp: Utc.timestamp_opt(1_714_557_600 + i as i64 * 60, 0).unwrap(),
                    value: *v,
                })
                .collect(),
        }
    }

    #[test]
    fn series_statistics() {
        let (summaries, anomalies) = summarize_series(&[series(&[1.0, 2.0, 3.0, 6.0])]);
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.series, "cpu");
        assert_eq!(s.samples, 4);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 6.0);
        assert_eq!(s.mean, 3.0);
        assert_eq!(s.last, 6.0);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn spike_is_an_anomaly() {
        let mut values = vec![10.0; 20];
        values.push(100.0);
        let (_, anomalies) = summarize_series(&[series(&values)]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].value, 100.0);
        assert!(anomalies[0].z_score > ANOMALY_Z_SCORE);
    }

    #[test]
    fn flat_and_empty_series_have_no_anomalies() {
        let (summaries, anomalies) = summarize_series(&[series(&[5.0; 30]), series(&[])]);
        assert_eq!(summaries.len(), 1);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn levels_from_labels_and_keywords() {
        let mut labelled = line(0, "something happened");
        labelled.labels.insert("level".into(), "WARNING".into());
        assert_eq!(classify_level(&labelled), "warn");
        assert_eq!(classify_level(&line(0, "ERROR db connection refused")), "error");
        assert_eq!(classify_level(&line(0, "level=info msg=ok")), "info");
        assert_eq!(classify_level(&line(0, "request served")), "unknown");
    }

    #[test]
    fn signatures_mask_variable_parts() {
        assert_eq!(
            error_signature("timeout after 3000ms on conn 0x7f3a req 550e8400-e29b-41d4-a716-446655440000"),
            "timeout after <n>ms on conn <hex> req <id>"
        );
    }

    #[test]
    fn error_patterns_group_and_rank() {
        let lines = vec![
            line(0, "error: connection refused to 10.0.0.1"),
            line(1, "error: connection refused to 10.0.0.2"),
            line(2, "error: disk full"),
            line(3, "info: all good"),
        ];
        let patterns = error_patterns(&lines);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].count, 2);
        assert_eq!(patterns[0].pattern, "error: connection refused to <n>.<n>.<n>.<n>");
        assert_eq!(patterns[1].pattern, "error: disk full");
    }

    #[test]
    fn excerpts_put_errors_first_and_cap() {
        let mut lines: Vec<LogLine> = (0..30).map(|i| line(i, "info: tick")).collect();
        lines.push(line(5, "error: boom"));
        let out = excerpts(&lines);
        assert_eq!(out.len(), MAX_LOG_EXCERPTS);
        assert_eq!(out[0].line, "error: boom");
        assert_eq!(out[1].timestamp, line(29, "").timestamp);
    }

    #[test]
    fn counts_by_level() {
        let counts = level_counts(&[line(0, "error x"), line(1, "warn y"), line(2, "error z")]);
        assert_eq!(counts["error"], 2);
        assert_eq!(counts["warn"], 1);
    }
}
