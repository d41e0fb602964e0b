//! Pipeline stage definitions.
//!
//! Every stage is the same operation: render a prompt from the run so far,
//! ask the model, and recover a record carrying the stage's required keys.
//! Stages differ only in their template and key set.

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use crate::completion::Completion;
use crate::config::PromptsConfig;
use crate::error::Result;
use crate::orchestrator::RunContext;
use crate::recovery::{StageRecord, recover};
use crate::script::Segment;

pub const RESEARCH_KEYS: &[&str] = &["key_points", "facts", "statistics", "expert_opinions", "trends"];
pub const CONTENT_KEYS: &[&str] = &["title", "description", "keywords", "segments"];
pub const FACT_CHECK_KEYS: &[&str] = &["verified_claims", "uncertain_claims", "unverified_claims"];
pub const SHOW_NOTES_KEYS: &[&str] = &["title", "description", "chapters"];
pub const AUDIO_PARAMS_KEYS: &[&str] = &["voice", "music"];

/// A single LLM-driven step in the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStage {
    /// Short name used in errors and logs.
    pub name: &'static str,
    /// Human-readable name used in progress events.
    pub display_name: &'static str,
    /// Status reported when the stage starts.
    pub start_status: &'static str,
    pub template: String,
    pub required_keys: &'static [&'static str],
}

impl PipelineStage {
    pub fn research(template: impl Into<String>) -> Self {
        Self {
            name: "research",
            display_name: "Research Agent",
            start_status: "Starting research phase...",
            template: template.into(),
            required_keys: RESEARCH_KEYS,
        }
    }

    pub fn content(template: impl Into<String>) -> Self {
        Self {
            name: "content",
            display_name: "Content Creator",
            start_status: "Creating podcast content...",
            template: template.into(),
            required_keys: CONTENT_KEYS,
        }
    }

    pub fn fact_check(template: impl Into<String>) -> Self {
        Self {
            name: "fact check",
            display_name: "Fact Checker",
            start_status: "Verifying facts...",
            template: template.into(),
            required_keys: FACT_CHECK_KEYS,
        }
    }

    pub fn show_notes(template: impl Into<String>) -> Self {
        Self {
            name: "show notes",
            display_name: "Show Notes Agent",
            start_status: "Creating show notes...",
            template: template.into(),
            required_keys: SHOW_NOTES_KEYS,
        }
    }

    /// Runs once per segment.
    pub fn audio_params(template: impl Into<String>) -> Self {
        Self {
            name: "audio enhancement",
            display_name: "Audio Enhancement Agent",
            start_status: "Optimizing audio parameters...",
            template: template.into(),
            required_keys: AUDIO_PARAMS_KEYS,
        }
    }

    /// Render the prompt, replacing placeholders with the run state.
    ///
    /// Placeholders are substituted in one pass, so braces inside the
    /// substituted text are left as they are. Unknown placeholders stay
    /// literal.
    pub fn build_prompt(&self, ctx: &RunContext, segment: Option<&Segment>) -> String {
        let re = match Regex::new(r"\{(\w+)\}") {
            Ok(re) => re,
            Err(_) => return self.template.clone(),
        };

        re.replace_all(&self.template, |caps: &Captures| match &caps[1] {
            "topic" => ctx.topic.clone(),
            "duration" => ctx.duration_minutes.to_string(),
            "style" => ctx.style.clone(),
            "sources" if ctx.sources.is_empty() => "None provided.".to_string(),
            "sources" => pretty(&ctx.sources),
            "research" => pretty(&ctx.research),
            "content" => pretty(&ctx.content),
            "fact_check" => pretty(&ctx.fact_check),
            "segment" => pretty(&segment),
            _ => caps[0].to_string(),
        })
        .into_owned()
    }

    /// Build the prompt, call the model and recover the stage record.
    pub async fn execute(
        &self,
        completion: &dyn Completion,
        ctx: &RunContext,
        segment: Option<&Segment>,
    ) -> Result<StageRecord> {
        let prompt = self.build_prompt(ctx, segment);
        debug!("{} prompt is {} characters", self.name, prompt.len());
        let raw = completion.complete(&prompt).await?;
        recover(&raw, self.name, self.required_keys)
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// The five stages in pipeline order.
#[derive(Debug, Clone)]
pub struct PipelineStages {
    pub research: PipelineStage,
    pub content: PipelineStage,
    pub fact_check: PipelineStage,
    pub show_notes: PipelineStage,
    pub audio_params: PipelineStage,
}

impl PipelineStages {
    pub fn from_prompts(prompts: &PromptsConfig) -> Self {
        Self {
            research: PipelineStage::research(&prompts.research),
            content: PipelineStage::content(&prompts.content),
            fact_check: PipelineStage::fact_check(&prompts.fact_check),
            show_notes: PipelineStage::show_notes(&prompts.show_notes),
            audio_params: PipelineStage::audio_params(&prompts.audio_params),
        }
    }
}

impl Default for PipelineStages {
    fn default() -> Self {
        Self::from_prompts(&PromptsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_prompt_replaces_placeholders() {
        let stage = PipelineStage::content("{duration} min {style} on {topic}: {research}");
        let mut ctx = RunContext::new("tides", 5, "Educational");
        ctx.research = json!({"facts": ["moon"]}).as_object().cloned();

        let prompt = stage.build_prompt(&ctx, None);
        assert!(prompt.starts_with("5 min Educational on tides: {"));
        assert!(prompt.contains("\"moon\""));
    }

    #[test]
    fn test_build_prompt_with_segment() {
        let stage = PipelineStage::audio_params("Tune: {segment}");
        let ctx = RunContext::new("tides", 5, "Educational");
        let segment = Segment::from_value(0, &json!({"content": "The tide is high."})).unwrap();

        let prompt = stage.build_prompt(&ctx, Some(&segment));
        assert!(prompt.contains("The tide is high."));
    }

    #[test]
    fn test_build_prompt_does_not_expand_substituted_text() {
        let stage = PipelineStage::content("{topic} | {research} | {unknown}");
        let mut ctx = RunContext::new("Why {segment} matters", 5, "Educational");
        ctx.research = json!({"note": "see {topic}"}).as_object().cloned();

        let prompt = stage.build_prompt(&ctx, None);
        assert!(prompt.starts_with("Why {segment} matters | {"));
        assert!(prompt.contains("\"see {topic}\""));
        assert!(prompt.ends_with("| {unknown}"));
    }

    #[test]
    fn test_build_prompt_without_sources() {
        let stage = PipelineStage::research("{sources}");
        let ctx = RunContext::new("tides", 5, "Educational");
        assert_eq!(stage.build_prompt(&ctx, None), "None provided.");
    }

    #[test]
    fn test_default_stage_keys() {
        let stages = PipelineStages::default();
        assert_eq!(stages.research.required_keys, RESEARCH_KEYS);
        assert_eq!(stages.audio_params.display_name, "Audio Enhancement Agent");
        assert!(stages.content.template.contains("{research}"));
    }
}
