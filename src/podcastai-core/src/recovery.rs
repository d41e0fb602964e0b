//! Structured-output recovery.
//!
//! Model output is supposed to be a JSON object but frequently arrives as a
//! Python dict, with prose around it, or with broken punctuation. Recovery
//! tries, in order:
//!
//! 1. a literal-only parse of the span between the first `{` and the last `}`;
//! 2. a bounded text repair of that span followed by a strict JSON parse.
//!
//! If both fail, or the recovered record lacks a required key, the stage
//! fails with [`PodcastError::Recovery`].

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::error::{PodcastError, Result};
use crate::literal::parse_literal;

/// A structured record recovered from one stage's output.
pub type StageRecord = Map<String, Value>;

/// Recover a record from raw model output and check its required keys.
#[instrument(skip(raw, required_keys), fields(raw_len = raw.len()))]
pub fn recover(raw: &str, stage: &str, required_keys: &[&str]) -> Result<StageRecord> {
    let record = match parse_literal_span(raw) {
        Ok(record) => record,
        Err(literal_err) => {
            debug!("Literal parse of {} output failed: {}", stage, literal_err);
            match parse_repaired_span(raw) {
                Ok(record) => {
                    debug!("Recovered {} output after text repair", stage);
                    record
                }
                Err(repair_err) => {
                    warn!("Could not recover {} output", stage);
                    return Err(PodcastError::recovery(
                        stage,
                        format!(
                            "literal parse failed ({}); repaired JSON parse failed ({})",
                            literal_err, repair_err
                        ),
                        raw,
                    ));
                }
            }
        }
    };

    let missing: Vec<&str> = required_keys
        .iter()
        .copied()
        .filter(|key| !record.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(PodcastError::recovery(
            stage,
            format!("missing required keys: {}", missing.join(", ")),
            raw,
        ));
    }

    Ok(record)
}

/// The substring from the first `{` to the last `}` inclusive.
fn extract_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn parse_literal_span(raw: &str) -> std::result::Result<StageRecord, String> {
    let span = extract_object_span(raw).ok_or("no '{...}' span found")?;
    match parse_literal(span).map_err(|e| e.to_string())?.into_json() {
        Value::Object(record) => Ok(record),
        other => Err(format!("expected a mapping, found {}", other)),
    }
}

fn parse_repaired_span(raw: &str) -> std::result::Result<StageRecord, String> {
    let span = extract_object_span(raw).ok_or("no '{...}' span found")?;
    let repaired = repair_json(span);
    debug!("Repaired span: {}", repaired);
    match serde_json::from_str::<Value>(&repaired).map_err(|e| e.to_string())? {
        Value::Object(record) => Ok(record),
        other => Err(format!("expected an object, found {}", other)),
    }
}

/// Apply the repair pass to an extracted `{...}` span.
pub fn repair_json(span: &str) -> String {
    let mut text = span.replace('\'', "\"");
    text = replace_all(&text, r"\bNone\b", "null");
    text = replace_all(&text, r"\bTrue\b", "true");
    text = replace_all(&text, r"\bFalse\b", "false");
    // Bare identifier keys
    text = replace_all(&text, r"([{,])\s*([A-Za-z_][A-Za-z0-9_]*)\s*:", r#"${1} "${2}":"#);
    // Trailing commas
    text = replace_all(&text, r",(\s*[}\]])", "${1}");
    // "a" + "b"
    text = replace_all(&text, r#""\s*\+\s*""#, "");
    text = replace_all(&text, r"\s+", " ");
    text = insert_missing_commas(&text);
    text.chars().filter(|c| !c.is_control()).collect()
}

fn replace_all(text: &str, pattern: &str, replacement: &str) -> String {
    match regex::Regex::new(pattern) {
        Ok(re) => re.replace_all(text, replacement).to_string(),
        Err(_) => text.to_string(),
    }
}

/// Insert commas between adjacent values that lack a separator.
///
/// Covers both value/value pairs (`"a" "b"`, `1 2`, `"x" {`) and bracket
/// pairs (`}{`, `][`, `}[`, `]{`). Text inside string literals is never
/// touched.
fn insert_missing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    // Last significant character outside a string, and whether whitespace
    // followed it.
    let mut last: Option<char> = None;
    let mut gap = false;

    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                last = Some('"');
                gap = false;
            }
            continue;
        }

        if c.is_whitespace() {
            gap = true;
            out.push(c);
            continue;
        }

        let starts_value = matches!(c, '"' | '{' | '[' | '-') || c.is_alphanumeric();
        if starts_value {
            let needs_comma = match last {
                Some('"' | '}' | ']') => true,
                Some(prev) if prev.is_alphanumeric() => gap,
                _ => false,
            };
            if needs_comma {
                // Keep the comma attached to the previous token.
                let trailing_ws = out.len() - out.trim_end().len();
                let insert_at = out.len() - trailing_ws;
                out.insert(insert_at, ',');
            }
        }

        out.push(c);
        if c == '"' {
            in_string = true;
        }
        last = Some(c);
        gap = false;
    }

    out
}
