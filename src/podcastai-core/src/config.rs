//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PodcastError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub music: MusicConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Episode shape and model selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: String,
    pub duration_minutes: u32,
    pub style: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            duration_minutes: 10,
            style: "Conversational".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Voice id (`af_bella`) or display name (`Bella (American Female)`).
    pub voice: String,
    /// `American` or `British`.
    pub accent: String,
    pub speed: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "af_bella".to_string(),
            accent: "American".to_string(),
            speed: 1.0,
        }
    }
}

/// Background music configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    pub enabled: bool,
    /// Directory holding `<mood>.wav` tracks.
    pub directory: PathBuf,
    /// Volume used when a segment does not specify one.
    pub volume_db: f32,
    /// Per-mood path overrides.
    pub tracks: BTreeMap<String, PathBuf>,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("music"),
            volume_db: -20.0,
            tracks: BTreeMap::new(),
        }
    }
}

/// Output artifact configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory; the file name is derived from the title.
    pub directory: Option<PathBuf>,
}

/// Prompt templates for each stage.
///
/// Placeholders: `{topic}`, `{duration}`, `{style}`, `{sources}`,
/// `{research}`, `{content}`, `{fact_check}`, `{segment}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub research: String,
    pub content: String,
    pub fact_check: String,
    pub show_notes: String,
    pub audio_params: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            research: DEFAULT_RESEARCH_PROMPT.to_string(),
            content: DEFAULT_CONTENT_PROMPT.to_string(),
            fact_check: DEFAULT_FACT_CHECK_PROMPT.to_string(),
            show_notes: DEFAULT_SHOW_NOTES_PROMPT.to_string(),
            audio_params: DEFAULT_AUDIO_PARAMS_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        pipeline: PipelineConfig::default(),
        voice: VoiceConfig::default(),
        music: MusicConfig::default(),
        output: OutputConfig::default(),
        prompts: PromptsConfig::default(),
    }
}

const DEFAULT_RESEARCH_PROMPT: &str = r#"You are a senior research analyst preparing material for a podcast episode.

TOPIC: {topic}

SOURCES ALREADY GATHERED:
{sources}

TASKS:
- Gather key information, statistics and expert opinions on the topic
- Identify current trends and developments
- Prefer reliable, up-to-date sources

Respond with a single JSON object and nothing else:
{
    "key_points": ["main point", ...],
    "facts": ["verified fact", ...],
    "statistics": ["relevant statistic", ...],
    "expert_opinions": ["expert view", ...],
    "trends": ["current trend", ...],
    "sources": ["source URL", ...]
}
"#;

const DEFAULT_CONTENT_PROMPT: &str = r#"You are an experienced podcast producer. Write a {duration}-minute podcast script in a {style} style based on this research:
{research}

Cover an engaging introduction, the main discussion points, expert insights, case studies, future implications and a conclusion.

Respond with a single JSON object and nothing else:
{
    "title": "podcast title",
    "description": "episode description",
    "keywords": ["relevant", "keywords"],
    "segments": [
        {
            "timestamp": "MM:SS",
            "title": "segment title",
            "speaker": "Host|Guest|Expert",
            "tone": "emotional tone",
            "music": {"mood": "upbeat|calm|dramatic|tech|inspirational", "volume": -20},
            "sound_effect": "transition|highlight|quote|stats|conclusion",
            "content": "the exact words to be spoken"
        }
    ]
}

RULES:
- Each segment should run two to three minutes when read aloud
- The content field MUST contain the full text to be spoken
- Music volume is in decibels between -30 and -10
"#;

const DEFAULT_FACT_CHECK_PROMPT: &str = r#"You are a meticulous fact checker. Verify every factual claim in this podcast script:
{content}

For each claim assign a confidence score from 0 to 100 and note the supporting evidence.

Respond with a single JSON object and nothing else:
{
    "verified_claims": [
        {"claim": "claim text", "confidence": 90, "evidence": "supporting evidence", "source": "source URL"}
    ],
    "uncertain_claims": [],
    "unverified_claims": []
}
"#;

const DEFAULT_SHOW_NOTES_PROMPT: &str = r#"You write show notes for podcast episodes. Use this script and fact check:

SCRIPT:
{content}

FACT CHECK:
{fact_check}

Respond with a single JSON object and nothing else:
{
    "title": "episode title",
    "description": "episode description",
    "chapters": [{"timestamp": "MM:SS", "title": "chapter title", "summary": "chapter summary"}],
    "key_points": ["point", ...],
    "expert_quotes": ["quote", ...],
    "facts_and_stats": ["fact", ...],
    "sources": ["source", ...],
    "further_reading": ["resource", ...]
}
"#;

const DEFAULT_AUDIO_PARAMS_PROMPT: &str = r#"You are an audio engineer. Choose audio parameters for this podcast segment:
{segment}

Respond with a single JSON object and nothing else:
{
    "voice": {"pitch": 1.0, "speed": 1.0, "emotion": "emotion type"},
    "music": {"track": "track name", "volume": -20, "fade_in": 1.5, "fade_out": 1.5},
    "effects": [{"type": "effect type", "timestamp": "MM:SS", "duration": 1.0}]
}

Speed must be between 0.8 and 1.2.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.pipeline.model, "deepseek-chat");
        assert_eq!(config.voice.accent, "American");
        assert_eq!(config.music.volume_db, -20.0);
        assert!(config.prompts.research.contains("{topic}"));
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_str(
            r#"
            [pipeline]
            style = "Educational"
            duration_minutes = 5

            [music]
            enabled = false

            [music.tracks]
            calm = "/srv/music/rain.wav"

            [prompts]
            research = "Research {topic} briefly."
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.style, "Educational");
        assert_eq!(config.pipeline.duration_minutes, 5);
        assert_eq!(config.pipeline.max_tokens, 4096);
        assert!(!config.music.enabled);
        assert_eq!(
            config.music.tracks.get("calm"),
            Some(&PathBuf::from("/srv/music/rain.wav"))
        );
        assert_eq!(config.prompts.research, "Research {topic} briefly.");
        assert!(config.prompts.content.contains("{research}"));
    }

    #[test]
    fn test_invalid_config() {
        let err = Config::from_str("[pipeline]\nduration_minutes = \"ten\"").unwrap_err();
        assert!(matches!(err, PodcastError::ConfigError(_)));
    }
}
