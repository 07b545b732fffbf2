//! # kiln-providers
//!
//! Language-model provider layer for Kiln.
//!
//! This crate provides:
//! - Provider trait for abstracting chat-completion backends
//! - An OpenAI-compatible implementation (OpenAI, DeepSeek, local gateways)
//! - Provider registry and selection

pub mod openai;
pub mod registry;
pub mod traits;

pub use openai::OpenAIProvider;
pub use registry::ProviderRegistry;
pub use traits::{CompletionRequest, CompletionResponse, FinishReason, Provider, Usage};
