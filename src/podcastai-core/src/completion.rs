//! Language-model completion backends.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::PipelineConfig;
use crate::error::{PodcastError, Result};

/// Anything that turns a prompt into model text.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Settings for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// API key for authentication.
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionConfig {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }

    /// Take model, token limit and temperature from the pipeline config.
    pub fn with_pipeline(mut self, pipeline: &PipelineConfig) -> Self {
        self.model = pipeline.model.clone();
        self.max_tokens = pipeline.max_tokens;
        self.temperature = pipeline.temperature;
        self
    }
}

/// Chat completion against an OpenAI-compatible API.
pub struct OpenAiCompletion {
    client: Client<OpenAIConfig>,
    config: CompletionConfig,
}

impl OpenAiCompletion {
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base);

        let client = Client::with_config(openai_config).with_http_client(http_client);

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Completion for OpenAiCompletion {
    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .max_completion_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: prompt.to_string().into(),
                    name: None,
                },
            )])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| PodcastError::Completion("response contained no content".to_string()))?;

        debug!("Received {} characters", content.len());
        Ok(strip_reasoning(&content))
    }
}

/// Strip reasoning blocks such as `<think>...</think>` from model output.
///
/// These blocks can contain braces of their own, which would otherwise end up
/// inside the span handed to recovery.
pub fn strip_reasoning(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "reasoning",
        "thought",
        "scratchpad",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning_think_block() {
        let input = "<think>Maybe {\"draft\": 1}?</think>{\"title\": \"Final\"}";
        assert_eq!(strip_reasoning(input), "{\"title\": \"Final\"}");
    }

    #[test]
    fn test_strip_reasoning_multiline() {
        let input = "<thinking>\nMultiple\nlines\n</thinking>\n{\"a\": 1}\n";
        assert_eq!(strip_reasoning(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_reasoning_keeps_plain_output() {
        let input = "Here you go: {'a': '<b>bold</b>'}";
        assert_eq!(strip_reasoning(input), input);
    }

    #[test]
    fn test_completion_config_with_pipeline() {
        let pipeline = PipelineConfig {
            model: "llama3:8b".to_string(),
            max_tokens: 1000,
            ..PipelineConfig::default()
        };
        let config = CompletionConfig::new("http://localhost:11434/v1", "").with_pipeline(&pipeline);
        assert_eq!(config.model, "llama3:8b");
        assert_eq!(config.max_tokens, 1000);
    }
}
