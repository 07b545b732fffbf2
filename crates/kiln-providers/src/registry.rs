//! Provider registry for managing available providers.

use std::collections::HashMap;
use std::sync::Arc;

use kiln_core::Config;

use super::openai::OpenAIProvider;
use super::traits::Provider;

/// Registry of available language-model providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
        }
    }

    /// Initialize registry with all available providers based on configuration.
    ///
    /// API keys come from the config first, then from the environment
    /// (DEEPSEEK_API_KEY, OPENAI_API_KEY).
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        let deepseek_key = config
            .providers
            .deepseek
            .as_ref()
            .and_then(|c| c.resolve_api_key())
            .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok());

        if let Some(api_key) = deepseek_key {
            let mut provider = OpenAIProvider::deepseek(api_key);
            if let Some(ref deepseek_config) = config.providers.deepseek {
                if let Some(ref base_url) = deepseek_config.base_url {
                    provider = provider.with_base_url(base_url);
                }
                if let Some(ref model) = deepseek_config.default_model {
                    provider = provider.with_default_model(model);
                }
            }
            registry.register(Arc::new(provider));
        }

        let openai_key = config
            .providers
            .openai
            .as_ref()
            .and_then(|c| c.resolve_api_key())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        if let Some(api_key) = openai_key {
            let mut provider = OpenAIProvider::new(api_key);
            if let Some(ref openai_config) = config.providers.openai {
                if let Some(ref base_url) = openai_config.base_url {
                    provider = provider.with_base_url(base_url);
                }
                if let Some(ref model) = openai_config.default_model {
                    provider = provider.with_default_model(model);
                }
            }
            if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
                provider = provider.with_base_url(base_url);
            }
            registry.register(Arc::new(provider));
        }

        let preferred = config
            .providers
            .default_provider
            .clone()
            .unwrap_or_else(|| config.general.provider.clone());
        if registry.providers.contains_key(&preferred) {
            registry.default_provider = Some(preferred);
        }

        registry
    }

    /// Register a provider. The first registered provider becomes the default.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(id.clone());
        }
        self.providers.insert(id, provider);
    }

    /// Get a provider by ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.default_provider.as_ref().and_then(|id| self.get(id))
    }

    /// Set the default provider. Returns false if it is not registered.
    pub fn set_default(&mut self, id: &str) -> bool {
        if self.providers.contains_key(id) {
            self.default_provider = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// List all providers.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
