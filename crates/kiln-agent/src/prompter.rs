//! Turns conversation history into a model completion.

use std::sync::Arc;

use kiln_core::Turn;
use kiln_providers::{CompletionRequest, Provider};
use tracing::{debug, error, instrument, warn};

/// Reply used whenever the model cannot be reached.
pub const APOLOGY: &str = "My brain disconnected, try again.";

/// System prompt used when the configuration does not override it.
///
/// `$NAME` is replaced with the agent's name and `$COMMAND_DOCS` with the
/// rendered command documentation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a playful Minecraft bot named $NAME that can \
converse with players, see, move, mine, build, and interact with the world by using commands. \
Act human-like as if you were a typical Minecraft player, rather than an AI. Be very brief in \
your responses, don't apologize constantly, don't give instructions or make lists unless asked, \
and don't refuse requests. Don't pretend to act, use commands immediately when requested. Do NOT \
say this: 'Sure, I've stopped.', instead say this: 'Sure, I'll stop. !stop'. Do NOT say this: \
'On my way! Give me a moment.', instead say this: 'On my way! !goToPlayer playername 3'.\n\
$COMMAND_DOCS";

/// Builds completion requests for one agent.
pub struct Prompter {
    provider: Arc<dyn Provider>,
    name: String,
    model: String,
    template: String,
    command_docs: String,
}

impl Prompter {
    /// Create a prompter using the provider's default model and the default template.
    pub fn new(provider: Arc<dyn Provider>, name: impl Into<String>, command_docs: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
            model: String::new(),
            template: DEFAULT_SYSTEM_PROMPT.to_string(),
            command_docs: command_docs.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// The system prompt with placeholders substituted.
    pub fn system_prompt(&self) -> String {
        self.template
            .replace("$NAME", &self.name)
            .replace("$COMMAND_DOCS", &self.command_docs)
    }

    /// Ask the model for the next reply.
    ///
    /// Never fails: a context overflow drops the oldest turn and retries,
    /// anything else yields [`APOLOGY`].
    #[instrument(skip(self, turns), fields(provider = %self.provider.id(), turns = turns.len()))]
    pub async fn prompt_convo(&self, mut turns: Vec<Turn>) -> String {
        let system = self.system_prompt();
        loop {
            let request = CompletionRequest::new(self.model.clone(), turns.clone()).with_system(system.clone());
            match self.provider.complete(request).await {
                Ok(response) => {
                    debug!(usage = ?response.usage, "Received completion");
                    return response.content;
                }
                Err(e) if e.is_context_length() && turns.len() > 1 => {
                    warn!(remaining = turns.len() - 1, "Context length exceeded, retrying with shorter history");
                    turns.remove(0);
                }
                Err(e) => {
                    error!(error = %e, "Completion failed");
                    return APOLOGY.to_string();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kiln_core::ProviderError;
    use kiln_providers::CompletionResponse;

    /// Overflows until the history is at most `fits` turns long.
    struct ShrinkingProvider {
        fits: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for ShrinkingProvider {
        fn id(&self) -> &str {
            "mock"
        }
        fn name(&self) -> &str {
            "Mock"
        }
        fn default_model(&self) -> &str {
            "mock-model"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.turns.len() > self.fits {
                return Err(ProviderError::ContextLengthExceeded {
                    provider: "mock".to_string(),
                });
            }
            let first = request.turns.first().map(|t| t.text.clone()).unwrap_or_default();
            Ok(CompletionResponse::text(format!("oldest: {}", first)))
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl Provider for BrokenProvider {
        fn id(&self) -> &str {
            "broken"
        }
        fn name(&self) -> &str {
            "Broken"
        }
        fn default_model(&self) -> &str {
            "none"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            Err(ProviderError::api_error("broken", 500, "internal error"))
        }
    }

    fn turns(n: usize) -> Vec<Turn> {
        (0..n).map(|i| Turn::new("andy", "Bob", format!("msg {}", i))).collect()
    }

    #[test]
    fn test_system_prompt_substitution() {
        let prompter = Prompter::new(Arc::new(BrokenProvider), "andy", "DOCS")
            .with_template("I am $NAME.\n$COMMAND_DOCS");
        assert_eq!(prompter.system_prompt(), "I am andy.\nDOCS");
    }

    #[tokio::test]
    async fn test_context_overflow_drops_oldest() {
        let provider = Arc::new(ShrinkingProvider {
            fits: 2,
            calls: AtomicUsize::new(0),
        });
        let prompter = Prompter::new(provider.clone(), "andy", "");
        let reply = prompter.prompt_convo(turns(4)).await;
        assert_eq!(reply, "oldest: msg 2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_overflow_on_single_turn_apologizes() {
        let provider = Arc::new(ShrinkingProvider {
            fits: 0,
            calls: AtomicUsize::new(0),
        });
        let prompter = Prompter::new(provider.clone(), "andy", "");
        assert_eq!(prompter.prompt_convo(turns(3)).await, APOLOGY);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_apologizes() {
        let prompter = Prompter::new(Arc::new(BrokenProvider), "andy", "");
        assert_eq!(prompter.prompt_convo(turns(1)).await, APOLOGY);
    }
}
