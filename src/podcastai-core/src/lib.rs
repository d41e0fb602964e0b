//! PodcastAI Core Library
//!
//! Provides the podcast pipeline: language-model stages with structured
//! output recovery, speech synthesis, background music mixing and final
//! track assembly.

pub mod assembler;
pub mod completion;
pub mod config;
pub mod error;
pub mod literal;
pub mod mixer;
pub mod orchestrator;
pub mod recovery;
pub mod script;
pub mod stage;
pub mod tts;

pub use assembler::{MusicLibrary, PodcastAssembler, PodcastRecord, generate_output_filename};
pub use completion::{Completion, CompletionConfig, OpenAiCompletion};
pub use config::{Config, default_config};
pub use error::PodcastError;
pub use orchestrator::{
    PipelineCallback, PipelineEvent, PipelineOrchestrator, RunContext, SourceDocument,
    SourceFinder,
};
pub use recovery::{StageRecord, recover};
pub use script::{FactCheckResult, PodcastScript, Segment};
pub use stage::{PipelineStage, PipelineStages};
pub use tts::{KokoroSynthesizer, Locale, SegmentSynthesizer, SpeechSynthesizer};
