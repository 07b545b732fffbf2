//! Provider trait definitions.

use async_trait::async_trait;
use kiln_core::{ProviderError, Turn};
use serde::{Deserialize, Serialize};

/// Request for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to use (empty selects the provider default)
    pub model: String,
    /// System prompt
    pub system: Option<String>,
    /// Conversation so far, oldest first
    pub turns: Vec<Turn>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0-2.0)
    pub temperature: Option<f32>,
    /// Stop sequences
    #[serde(default)]
    pub stop: Vec<String>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            system: None,
            turns,
            max_tokens: None,
            temperature: None,
            stop: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response content
    pub content: String,
    /// Finish reason
    pub finish_reason: FinishReason,
    /// Usage statistics
    pub usage: Usage,
}

impl CompletionResponse {
    /// A plain text response, mostly useful for tests and offline providers.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }
}

/// Reason the completion finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Normal completion
    Stop,
    /// Hit max tokens or the context limit
    Length,
    /// Content was filtered
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Core provider trait - all language-model backends implement this.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Model used when a request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Check if provider is configured and ready.
    fn is_configured(&self) -> bool;

    /// Generate a completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}
