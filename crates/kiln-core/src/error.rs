//! Error types for Kiln.
//!
//! This module provides the error hierarchy shared by the Kiln crates,
//! with structured errors that include context and recovery suggestions.

use thiserror::Error;

/// Result type alias using the Kiln error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Kiln.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider error with structured details
    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check your config file at ~/.config/kiln/config.toml"),
            Error::Provider(e) => e.recovery_suggestion(),
        }
    }

    /// Create a provider-not-configured error.
    pub fn provider_not_configured(provider: &str) -> Self {
        Error::Provider(ProviderError::NotConfigured {
            provider: provider.to_string(),
            env_var: match provider {
                "deepseek" => Some("DEEPSEEK_API_KEY".to_string()),
                "openai" => Some("OPENAI_API_KEY".to_string()),
                _ => None,
            },
        })
    }
}

/// Provider-specific errors with detailed context.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider not configured
    #[error("Provider '{provider}' is not configured")]
    NotConfigured {
        provider: String,
        env_var: Option<String>,
    },

    /// API request failed
    #[error("API request to {provider} failed: {status} - {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    /// The prompt no longer fits the model's context window
    #[error("Context length exceeded for {provider}")]
    ContextLengthExceeded { provider: String },

    /// The response could not be understood
    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    /// Network error
    #[error("Network error connecting to {provider}: {message}")]
    NetworkError { provider: String, message: String },
}

impl ProviderError {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::NotConfigured {
                env_var: Some(_), ..
            } => Some("Set the API key environment variable"),
            ProviderError::NotConfigured { .. } => {
                Some("Configure the provider in ~/.config/kiln/config.toml")
            }
            ProviderError::ApiError { status: 401, .. } => {
                Some("Check that your API key is valid and not expired")
            }
            ProviderError::ApiError { status: 429, .. } => {
                Some("You've hit rate limits. Wait a moment and try again")
            }
            ProviderError::ApiError {
                status: 500..=599, ..
            } => Some("The API service is having issues. Try again later"),
            ProviderError::ContextLengthExceeded { .. } => {
                Some("Clear the conversation with '!clearChat' or lower session.max_history")
            }
            ProviderError::NetworkError { .. } => Some("Check your internet connection"),
            _ => None,
        }
    }

    /// Create an API error from status code and message.
    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ProviderError::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Whether retrying with a shorter prompt could succeed.
    pub fn is_context_length(&self) -> bool {
        matches!(self, ProviderError::ContextLengthExceeded { .. })
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}
