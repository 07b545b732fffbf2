//! OpenAI-compatible chat completion provider.
//!
//! Works against OpenAI itself and any service exposing the same
//! `/chat/completions` endpoint (DeepSeek is the default backend).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use kiln_core::{ProviderError, Role, Turn};

use crate::traits::{CompletionRequest, CompletionResponse, FinishReason, Provider, Usage};

/// Default OpenAI API base URL.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Default DeepSeek API base URL.
pub const DEEPSEEK_API_URL: &str = "https://api.deepseek.com";

/// Provider for OpenAI-compatible chat completion APIs.
pub struct OpenAIProvider {
    id: String,
    name: String,
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAIProvider {
    /// Create a provider talking to OpenAI.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    /// Create a provider talking to DeepSeek.
    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self {
            id: "deepseek".to_string(),
            name: "DeepSeek".to_string(),
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEEPSEEK_API_URL.to_string(),
            default_model: "deepseek-chat".to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Convert the conversation into chat messages.
    ///
    /// Consecutive non-assistant turns are folded into one `user` message,
    /// one line per turn, so the API always sees alternating roles.
    fn format_messages(&self, system: Option<&str>, turns: &[Turn]) -> Vec<OpenAIMessage> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(OpenAIMessage::new("system", system));
        }

        let mut pending_user = String::new();
        for turn in turns {
            if turn.role == Role::Assistant {
                if !pending_user.is_empty() {
                    messages.push(OpenAIMessage::new("user", std::mem::take(&mut pending_user)));
                }
                messages.push(OpenAIMessage::new("assistant", turn.text.clone()));
            } else {
                pending_user.push_str(&turn.prompt_text());
                pending_user.push('\n');
            }
        }
        if !pending_user.is_empty() {
            messages.push(OpenAIMessage::new("user", pending_user));
        }

        messages
    }

    fn network_error(&self, err: reqwest::Error) -> ProviderError {
        ProviderError::NetworkError {
            provider: self.id.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, request), fields(provider = %self.id, turns = request.turns.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let api_request = OpenAIRequest {
            model,
            messages: self.format_messages(request.system.as_deref(), &request.turns),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
            stop: if request.stop.is_empty() {
                None
            } else {
                Some(request.stop.clone())
            },
        };

        debug!("Sending chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            if error_text.contains("context_length_exceeded") {
                warn!("Context length exceeded");
                return Err(ProviderError::ContextLengthExceeded {
                    provider: self.id.clone(),
                });
            }
            error!(status = %status, "Chat completion failed: {}", error_text);
            return Err(ProviderError::api_error(&self.id, status.as_u16(), error_text));
        }

        let body: OpenAIResponse = response.json().await.map_err(|e| self.network_error(e))?;

        let Some(choice) = body.choices.into_iter().next() else {
            return Err(ProviderError::MalformedResponse {
                provider: self.id.clone(),
                message: "response contained no choices".to_string(),
            });
        };

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        // A truncated answer is treated like an oversized prompt so callers
        // can retry with less history.
        if finish_reason == FinishReason::Length {
            return Err(ProviderError::ContextLengthExceeded {
                provider: self.id.clone(),
            });
        }

        let usage = body
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
            usage,
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
}

impl OpenAIMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
