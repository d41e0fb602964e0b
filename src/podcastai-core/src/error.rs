//! Error types for the podcast pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodcastError {
    /// Stage output could not be turned into a usable record.
    #[error("Failed to recover {stage} output: {reason}")]
    Recovery {
        stage: String,
        reason: String,
        /// The raw model output, kept for diagnostics.
        raw: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("No audio segments were generated successfully")]
    EmptyPodcast,

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Audio file error: {0}")]
    AudioIo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PodcastError {
    pub(crate) fn recovery(
        stage: impl Into<String>,
        reason: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        PodcastError::Recovery {
            stage: stage.into(),
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

impl From<hound::Error> for PodcastError {
    fn from(e: hound::Error) -> Self {
        PodcastError::AudioIo(e.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PodcastError>;
