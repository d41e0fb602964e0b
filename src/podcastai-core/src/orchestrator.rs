//! Podcast pipeline orchestration.
//!
//! Runs Research → Content → FactCheck → ShowNotes → AudioParams in order,
//! threading a [`RunContext`] through the stages and reporting progress.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::completion::Completion;
use crate::config::PromptsConfig;
use crate::error::{PodcastError, Result};
use crate::recovery::StageRecord;
use crate::script::{
    FactCheckResult, PodcastScript, Segment, keywords_from_value, normalize_segment_content,
    value_text,
};
use crate::stage::{PipelineStage, PipelineStages};

/// A document found by the research collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source: String,
    pub title: String,
    pub analysis: Value,
}

/// Upstream search and extraction step.
#[async_trait]
pub trait SourceFinder: Send + Sync {
    async fn find_sources(&self, topic: &str) -> Result<Vec<SourceDocument>>;
}

/// One entry in the run's progress log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub stage: String,
    pub status: String,
}

/// Per-run state threaded through the stages.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub topic: String,
    pub duration_minutes: u32,
    pub style: String,
    pub sources: Vec<SourceDocument>,
    pub research: Option<StageRecord>,
    /// The content record after segment post-processing.
    pub content: Option<StageRecord>,
    pub fact_check: Option<FactCheckResult>,
    pub show_notes: Option<StageRecord>,
    pub progress: Vec<ProgressEntry>,
}

impl RunContext {
    pub fn new(topic: impl Into<String>, duration_minutes: u32, style: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            duration_minutes,
            style: style.into(),
            sources: Vec::new(),
            research: None,
            content: None,
            fact_check: None,
            show_notes: None,
            progress: Vec::new(),
        }
    }
}

/// Events emitted while the pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A stage is starting.
    StageStarted { stage: String, status: String },
    /// A stage finished successfully.
    StageCompleted { stage: String, status: String },
    /// A stage failed; the run stops here.
    StageFailed { stage: String, error: String },
    /// All stages finished.
    PipelineFinished { title: String, segments: usize },
}

impl PipelineEvent {
    /// Human-readable name of the stage this event belongs to.
    pub fn stage(&self) -> &str {
        match self {
            PipelineEvent::StageStarted { stage, .. }
            | PipelineEvent::StageCompleted { stage, .. }
            | PipelineEvent::StageFailed { stage, .. } => stage,
            PipelineEvent::PipelineFinished { .. } => "System",
        }
    }

    pub fn status(&self) -> String {
        match self {
            PipelineEvent::StageStarted { status, .. }
            | PipelineEvent::StageCompleted { status, .. } => status.clone(),
            PipelineEvent::StageFailed { error, .. } => format!("Failed: {}", error),
            PipelineEvent::PipelineFinished { segments, .. } => {
                format!("Script complete with {} segments", segments)
            }
        }
    }
}

/// Callback for pipeline events.
pub type PipelineCallback = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// Sequences the language-model stages for one episode.
pub struct PipelineOrchestrator {
    completion: Arc<dyn Completion>,
    stages: PipelineStages,
    source_finder: Option<Arc<dyn SourceFinder>>,
    callback: Option<PipelineCallback>,
}

impl PipelineOrchestrator {
    pub fn new(completion: Arc<dyn Completion>, prompts: &PromptsConfig) -> Self {
        Self {
            completion,
            stages: PipelineStages::from_prompts(prompts),
            source_finder: None,
            callback: None,
        }
    }

    /// Set a callback for pipeline events.
    pub fn with_callback(mut self, callback: PipelineCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Fetch sources before the research stage.
    pub fn with_source_finder(mut self, finder: Arc<dyn SourceFinder>) -> Self {
        self.source_finder = Some(finder);
        self
    }

    /// Run every stage for a topic.
    pub async fn run(
        &self,
        topic: &str,
        duration_minutes: u32,
        style: &str,
    ) -> Result<PodcastScript> {
        let mut ctx = RunContext::new(topic, duration_minutes, style);
        self.run_with_context(&mut ctx).await
    }

    /// Run every stage, leaving intermediate records and the progress log in
    /// `ctx`. The first failing stage aborts the run with its error.
    #[instrument(skip(self, ctx), fields(topic = %ctx.topic))]
    pub async fn run_with_context(&self, ctx: &mut RunContext) -> Result<PodcastScript> {
        if let Some(finder) = &self.source_finder {
            match finder.find_sources(&ctx.topic).await {
                Ok(sources) => {
                    info!("Found {} sources", sources.len());
                    ctx.sources = sources;
                }
                Err(e) => warn!("Source search failed, continuing without sources: {}", e),
            }
        }

        let research = self.run_stage(&self.stages.research, ctx, Ok::<_, PodcastError>).await?;
        ctx.research = Some(research.clone());

        let (content, mut segments) = self.run_stage(&self.stages.content, ctx, build_content).await?;
        ctx.content = Some(content.clone());

        let fact_check = self
            .run_stage(&self.stages.fact_check, ctx, |record| {
                Ok(FactCheckResult::from_record(&record))
            })
            .await?;
        info!(
            "Fact check: {} verified, {} uncertain, {} unverified",
            fact_check.verified_claims.len(),
            fact_check.uncertain_claims.len(),
            fact_check.unverified_claims.len()
        );
        ctx.fact_check = Some(fact_check.clone());

        let show_notes = self
            .run_stage(&self.stages.show_notes, ctx, Ok::<_, PodcastError>)
            .await?;
        ctx.show_notes = Some(show_notes.clone());

        self.enhance_segments(ctx, &mut segments).await?;

        let script = PodcastScript {
            title: content
                .get("title")
                .and_then(value_text)
                .unwrap_or_else(|| "Untitled Podcast".to_string()),
            description: content
                .get("description")
                .and_then(value_text)
                .unwrap_or_default(),
            keywords: content
                .get("keywords")
                .map(keywords_from_value)
                .unwrap_or_default(),
            segments,
            research,
            fact_check,
            show_notes,
        };

        self.emit_event(
            ctx,
            PipelineEvent::PipelineFinished {
                title: script.title.clone(),
                segments: script.segments.len(),
            },
        );
        Ok(script)
    }

    /// Run one stage and post-process its record, reporting progress.
    async fn run_stage<T>(
        &self,
        stage: &PipelineStage,
        ctx: &mut RunContext,
        post_process: impl FnOnce(StageRecord) -> Result<T>,
    ) -> Result<T> {
        self.stage_started(ctx, stage);
        let outcome = match stage.execute(self.completion.as_ref(), ctx, None).await {
            Ok(record) => post_process(record),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(value) => {
                self.stage_completed(ctx, stage);
                Ok(value)
            }
            Err(e) => {
                self.stage_failed(ctx, stage, &e);
                Err(e)
            }
        }
    }

    /// Audio parameters are requested once per segment and stored on it.
    async fn enhance_segments(&self, ctx: &mut RunContext, segments: &mut [Segment]) -> Result<()> {
        let stage = &self.stages.audio_params;
        self.stage_started(ctx, stage);

        for (index, segment) in segments.iter_mut().enumerate() {
            debug!(
                "Requesting audio parameters for segment {} ({})",
                index + 1,
                segment.display_title()
            );
            match stage.execute(self.completion.as_ref(), ctx, Some(&*segment)).await {
                Ok(record) => segment.enhancements = Some(record),
                Err(e) => {
                    self.stage_failed(ctx, stage, &e);
                    return Err(e);
                }
            }
        }

        self.stage_completed(ctx, stage);
        Ok(())
    }

    fn stage_started(&self, ctx: &mut RunContext, stage: &PipelineStage) {
        info!("{}: {}", stage.display_name, stage.start_status);
        self.emit_event(
            ctx,
            PipelineEvent::StageStarted {
                stage: stage.display_name.to_string(),
                status: stage.start_status.to_string(),
            },
        );
    }

    fn stage_completed(&self, ctx: &mut RunContext, stage: &PipelineStage) {
        self.emit_event(
            ctx,
            PipelineEvent::StageCompleted {
                stage: stage.display_name.to_string(),
                status: "Completed".to_string(),
            },
        );
    }

    fn stage_failed(&self, ctx: &mut RunContext, stage: &PipelineStage, error: &PodcastError) {
        warn!("{} failed: {}", stage.display_name, error);
        self.emit_event(
            ctx,
            PipelineEvent::StageFailed {
                stage: stage.display_name.to_string(),
                error: error.to_string(),
            },
        );
    }

    /// Record the event and pass it to the callback, if any.
    fn emit_event(&self, ctx: &mut RunContext, event: PipelineEvent) {
        ctx.progress.push(ProgressEntry {
            stage: event.stage().to_string(),
            status: event.status(),
        });
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Post-process the content record into typed segments.
fn build_content(mut record: StageRecord) -> Result<(StageRecord, Vec<Segment>)> {
    let has_segments = matches!(record.get("segments"), Some(Value::Array(s)) if !s.is_empty());
    if !has_segments {
        return Err(PodcastError::recovery(
            "content",
            "no segments found",
            Value::Object(record).to_string(),
        ));
    }

    if let Some(Value::Array(raw_segments)) = record.get_mut("segments") {
        normalize_segment_content(raw_segments);
    }

    let segments = match record.get("segments") {
        Some(Value::Array(raw_segments)) => raw_segments
            .iter()
            .enumerate()
            .map(|(index, value)| Segment::from_value(index, value))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    Ok((record, segments))
}
