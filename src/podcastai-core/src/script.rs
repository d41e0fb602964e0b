//! Typed podcast script built from recovered stage records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{PodcastError, Result};
use crate::recovery::StageRecord;

/// Confidence at or above which a claim counts as verified.
pub const VERIFIED_THRESHOLD: u8 = 80;
/// Confidence at or above which an unverified claim counts as uncertain.
pub const UNCERTAIN_THRESHOLD: u8 = 50;

/// Background music cue for a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicCue {
    pub mood: Option<String>,
    /// Decibels when zero or negative, linear gain otherwise.
    pub volume: Option<f32>,
}

/// One ordered unit of the podcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub timestamp: Option<String>,
    pub title: Option<String>,
    pub speaker: Option<String>,
    pub tone: Option<String>,
    pub music: Option<MusicCue>,
    pub sound_effect: Option<String>,
    /// The text to be spoken.
    pub content: String,
    /// Audio parameters from the audio enhancement stage.
    pub enhancements: Option<StageRecord>,
    /// Fields the model added that have no typed counterpart.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Segment {
    /// Build a segment from a post-processed content record entry.
    pub fn from_value(index: usize, value: &Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(PodcastError::recovery(
                "content",
                format!("segment {} is not an object", index + 1),
                value.to_string(),
            ));
        };

        let content = fields.get("content").and_then(value_text).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(PodcastError::recovery(
                "content",
                format!("segment {} has no spoken content", index + 1),
                value.to_string(),
            ));
        }

        let mut extra = fields.clone();
        for key in [
            "timestamp",
            "title",
            "speaker",
            "tone",
            "music",
            "sound_effect",
            "content",
            "enhancements",
            "script",
            "lines",
        ] {
            extra.remove(key);
        }

        Ok(Self {
            timestamp: fields.get("timestamp").and_then(value_text),
            title: fields.get("title").and_then(value_text),
            speaker: fields.get("speaker").and_then(value_text),
            tone: fields.get("tone").and_then(value_text),
            music: fields.get("music").and_then(MusicCue::from_value),
            sound_effect: fields.get("sound_effect").and_then(value_text),
            content,
            enhancements: match fields.get("enhancements") {
                Some(Value::Object(map)) => Some(map.clone()),
                _ => None,
            },
            extra,
        })
    }

    /// Title for logs, `Untitled` when absent.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }

    /// Speaking speed requested by the enhancement record, if any.
    ///
    /// Looks at `speed` and then `voice.speed`.
    pub fn enhancement_speed(&self) -> Option<f32> {
        let enhancements = self.enhancements.as_ref()?;
        enhancements
            .get("speed")
            .and_then(value_number)
            .or_else(|| {
                enhancements
                    .get("voice")
                    .and_then(|voice| voice.get("speed"))
                    .and_then(value_number)
            })
            .map(|speed| speed as f32)
    }
}

impl MusicCue {
    /// A bare string is read as the mood.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(mood) if !mood.trim().is_empty() => Some(Self {
                mood: Some(mood.trim().to_string()),
                volume: None,
            }),
            Value::Object(fields) => Some(Self {
                mood: fields.get("mood").and_then(value_text),
                volume: fields
                    .get("volume")
                    .and_then(value_number)
                    .map(|v| v as f32)
                    .filter(|v| v.is_finite()),
            }),
            _ => None,
        }
    }
}

/// Fill in each segment's `content` field.
///
/// A segment without `content` falls back to `script`. A segment carrying
/// `lines` (a list of `{speaker, text}`) gets one `speaker: text` line per
/// entry.
pub fn normalize_segment_content(segments: &mut [Value]) {
    for segment in segments.iter_mut() {
        let Value::Object(fields) = segment else {
            continue;
        };

        if !fields.contains_key("content") {
            let script = fields.get("script").cloned().unwrap_or(Value::String(String::new()));
            fields.insert("content".to_string(), script);
        }

        if let Some(Value::Array(lines)) = fields.get("lines") {
            let joined = lines
                .iter()
                .map(|line| {
                    let speaker = line
                        .get("speaker")
                        .and_then(value_text)
                        .unwrap_or_else(|| "Speaker".to_string());
                    let text = line.get("text").and_then(value_text).unwrap_or_default();
                    format!("{}: {}", speaker, text)
                })
                .collect::<Vec<_>>()
                .join("\n");
            fields.insert("content".to_string(), Value::String(joined));
        }
    }
}

/// A single factual claim with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim: String,
    /// Integer confidence in `[0, 100]`.
    pub confidence: u8,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Keys that may hold a claim's text, in order of preference.
const CLAIM_TEXT_KEYS: [&str; 4] = ["claim", "statement", "text", "fact"];

impl Claim {
    /// An object without a recognised text key is kept with its JSON text as
    /// the claim. Bare scalars and lists become claims with confidence 0.
    /// Only null, blank strings and objects with nothing but a confidence
    /// yield `None`.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(fields) => {
                let confidence = fields.get("confidence").map(parse_confidence).unwrap_or(0);
                let mut details = fields.clone();
                details.remove("confidence");

                let text = CLAIM_TEXT_KEYS.iter().find_map(|key| {
                    fields
                        .get(*key)
                        .and_then(value_text)
                        .filter(|text| !text.trim().is_empty())
                        .map(|text| (*key, text))
                });
                let claim = match text {
                    Some((key, text)) => {
                        details.remove(key);
                        text
                    }
                    None if details.is_empty() => return None,
                    None => Value::Object(std::mem::take(&mut details)).to_string(),
                };

                Some(Self {
                    claim,
                    confidence,
                    details,
                })
            }
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::Array(_) => Some(Self::unscored(value.to_string())),
            other => value_text(other).map(Self::unscored),
        }
    }

    fn unscored(claim: String) -> Self {
        Self {
            claim,
            confidence: 0,
            details: Map::new(),
        }
    }
}

/// Parse a confidence score, clamping into `[0, 100]`.
///
/// Accepts numbers and numeric strings such as `"85"` or `"85%"`; anything
/// else scores 0.
pub fn parse_confidence(value: &Value) -> u8 {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match score {
        Some(score) if score.is_finite() => score.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

/// Claims partitioned by confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactCheckResult {
    pub verified_claims: Vec<Claim>,
    pub uncertain_claims: Vec<Claim>,
    pub unverified_claims: Vec<Claim>,
}

impl FactCheckResult {
    /// Partition claims by confidence: verified at 80 and above, uncertain
    /// from 50 to 79, unverified below 50.
    pub fn partition(claims: impl IntoIterator<Item = Claim>) -> Self {
        let mut result = Self::default();
        for claim in claims {
            if claim.confidence >= VERIFIED_THRESHOLD {
                result.verified_claims.push(claim);
            } else if claim.confidence >= UNCERTAIN_THRESHOLD {
                result.uncertain_claims.push(claim);
            } else {
                result.unverified_claims.push(claim);
            }
        }
        result
    }

    /// Collect every claim from a fact-check record and re-partition them by
    /// their own confidence, regardless of which list the model used.
    ///
    /// A list given as a single value is read as a one-element list.
    pub fn from_record(record: &StageRecord) -> Self {
        let mut claims = Vec::new();
        for key in ["verified_claims", "uncertain_claims", "unverified_claims"] {
            let items = match record.get(key) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(items)) => items.as_slice(),
                Some(single) => std::slice::from_ref(single),
            };
            for item in items {
                match Claim::from_value(item) {
                    Some(claim) => claims.push(claim),
                    None => warn!("Dropping empty {} entry: {}", key, item),
                }
            }
        }
        Self::partition(claims)
    }

    pub fn total(&self) -> usize {
        self.verified_claims.len() + self.uncertain_claims.len() + self.unverified_claims.len()
    }
}

/// Everything the language-model stages produce for one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastScript {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub segments: Vec<Segment>,
    pub research: StageRecord,
    pub fact_check: FactCheckResult,
    pub show_notes: StageRecord,
}

/// Read keywords given as a list, or as a single comma-separated string.
pub fn keywords_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .filter(|k| !k.trim().is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Text form of a scalar value. Containers and null have none.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric value of a number or a numeric string (`"-20"`, `"-20 dB"`).
pub fn value_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            let trimmed = trimmed
                .strip_suffix("dB")
                .or_else(|| trimmed.strip_suffix("db"))
                .unwrap_or(trimmed);
            trimmed.trim().parse().ok()
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}
