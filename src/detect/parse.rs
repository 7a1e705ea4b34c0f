//! Parsing of free-form detector responses into time segments.
//!
//! Responses are tried against a structured JSON parse first and a loose
//! numeric scan second; the first stage that yields a usable segment wins.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::segment::TimeSegment;

/// Longest span the numeric fallback will accept for one pair, in seconds.
pub const MAX_FALLBACK_SPAN_SECS: f64 = 15.0;

/// Outcome of a single parse stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Vec<TimeSegment>),
    Failed,
}

impl ParseOutcome {
    fn from_segments(segments: Vec<TimeSegment>) -> Self {
        if segments.is_empty() {
            ParseOutcome::Failed
        } else {
            ParseOutcome::Parsed(segments)
        }
    }
}

/// Remove a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the outermost `[...]` expression as a list of `[start, end]` pairs.
///
/// Entries that are not two numbers, or that do not form a valid segment, are
/// skipped individually.
pub fn parse_structured(text: &str) -> ParseOutcome {
    let text = strip_code_fence(text);

    let (Some(open), Some(close)) = (text.find('['), text.rfind(']')) else {
        return ParseOutcome::Failed;
    };
    if close <= open {
        return ParseOutcome::Failed;
    }

    let value: Value = match serde_json::from_str(&text[open..=close]) {
        Ok(value) => value,
        Err(e) => {
            debug!("Structured parse failed: {}", e);
            return ParseOutcome::Failed;
        }
    };

    let Value::Array(entries) = value else {
        return ParseOutcome::Failed;
    };

    let segments = entries
        .iter()
        .filter_map(|entry| {
            let pair = entry.as_array()?;
            if pair.len() != 2 {
                debug!("Skipping entry {}: not a pair", entry);
                return None;
            }
            let segment = TimeSegment::new(pair[0].as_f64()?, pair[1].as_f64()?);
            if segment.is_none() {
                debug!("Skipping entry {}: invalid bounds", entry);
            }
            segment
        })
        .collect();

    ParseOutcome::from_segments(segments)
}

fn number_regex() -> &'static Regex {
    static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    NUMBER_RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("Invalid regex"))
}

/// Pair every number in the text sequentially as `(start, end)`.
///
/// Pairs that are invalid or longer than `max_span` seconds are skipped.
pub fn parse_numeric_fallback(text: &str, max_span: f64) -> ParseOutcome {
    let numbers: Vec<f64> = number_regex()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    let segments = numbers
        .chunks_exact(2)
        .filter_map(|pair| TimeSegment::new(pair[0], pair[1]))
        .filter(|segment| segment.duration() <= max_span)
        .collect();

    ParseOutcome::from_segments(segments)
}

/// Run the parse stages in order and return the first usable result.
///
/// An empty result means the response carried no usable signal.
pub fn parse_segments(text: &str) -> Vec<TimeSegment> {
    let stages: [(&str, fn(&str) -> ParseOutcome); 2] = [
        ("structured", parse_structured),
        ("numeric fallback", |t| parse_numeric_fallback(t, MAX_FALLBACK_SPAN_SECS)),
    ];

    for (name, stage) in stages {
        if let ParseOutcome::Parsed(segments) = stage(text) {
            debug!("{} parse produced {} segments", name, segments.len());
            return segments;
        }
    }

    debug!("No usable segments in detector response");
    Vec::new()
}
