//! Agent assembly and lifecycle.
//!
//! The [`Agent`] wires one session's collaborators together:
//!
//! ## Architecture
//!
//! ```text
//! Agent
//! ├── AgentContext (shared with commands)
//! │   ├── World / Body / Skills (game collaborators)
//! │   ├── ActionExecutor (one action at a time)
//! │   ├── ModeRegistry (reactive behaviors)
//! │   └── HistoryStore (conversation memory)
//! ├── ModeScheduler (background tick loop)
//! ├── DispatchLoop (chat → model → commands)
//! └── AgentEventHandler (embedding callbacks)
//! ```

use std::sync::Arc;

use kiln_core::{Body, Config, Skills, World, SYSTEM_SPEAKER};
use kiln_providers::{Provider, ProviderRegistry};
use kiln_session::{HistoryStore, JsonFileHistory, StoreError};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::commands::CommandRegistry;
use crate::context::{AgentContext, IdleHandler};
use crate::dispatch::{DispatchLoop, DispatchReport};
use crate::executor::ActionExecutor;
use crate::modes::{default_behaviors, Behavior, ModeRegistry};
use crate::prompter::Prompter;
use crate::scheduler::ModeScheduler;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while assembling or running an agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A required collaborator was not supplied.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Configuration or provider setup failed.
    #[error(transparent)]
    Core(#[from] kiln_core::Error),

    /// Conversation history could not be loaded or saved.
    #[error("History error: {0}")]
    History(#[from] StoreError),

    /// `start` was called twice.
    #[error("Agent {0} is already running")]
    AlreadyStarted(String),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

// ============================================================================
// Event Handler
// ============================================================================

/// Callbacks for whatever embeds the agent.
pub trait AgentEventHandler: Send + Sync {
    /// A command is about to run on behalf of `source`.
    fn on_command(&self, _source: &str, _command: &str) {}

    /// An inbound message has been fully handled.
    fn on_turn_finished(&self, _source: &str, _report: &DispatchReport) {}

    /// The agent died in game.
    fn on_death(&self, _message: &str) {}

    /// The agent shut down.
    fn on_shutdown(&self, _reason: &str) {}
}

/// Default event handler that does nothing.
pub struct NoOpEventHandler;

impl AgentEventHandler for NoOpEventHandler {}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an [`Agent`] from its collaborators.
pub struct AgentBuilder {
    config: Config,
    world: Option<Arc<dyn World>>,
    body: Option<Arc<dyn Body>>,
    skills: Option<Arc<dyn Skills>>,
    provider: Option<Arc<dyn Provider>>,
    history: Option<Arc<dyn HistoryStore>>,
    commands: Option<CommandRegistry>,
    behaviors: Option<Vec<Box<dyn Behavior>>>,
    event_handler: Arc<dyn AgentEventHandler>,
}

impl AgentBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            world: None,
            body: None,
            skills: None,
            provider: None,
            history: None,
            commands: None,
            behaviors: None,
            event_handler: Arc::new(NoOpEventHandler),
        }
    }

    pub fn world(mut self, world: Arc<dyn World>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn body(mut self, body: Arc<dyn Body>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn skills(mut self, skills: Arc<dyn Skills>) -> Self {
        self.skills = Some(skills);
        self
    }

    /// Model backend. Defaults to the configured provider.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// History store. Defaults to a JSON file under the data directory.
    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Command set. Defaults to the built-ins.
    pub fn commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Behaviors in priority order. Defaults to the built-in modes.
    pub fn behaviors(mut self, behaviors: Vec<Box<dyn Behavior>>) -> Self {
        self.behaviors = Some(behaviors);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn AgentEventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn build(self) -> AgentResult<Agent> {
        let config = Arc::new(self.config);
        let name = config.general.name.clone();

        let world = self.world.ok_or_else(|| AgentError::NotConfigured("world".to_string()))?;
        let body = self.body.ok_or_else(|| AgentError::NotConfigured("body".to_string()))?;
        let skills = self.skills.ok_or_else(|| AgentError::NotConfigured("skills".to_string()))?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => {
                let registry = ProviderRegistry::from_config(&config);
                registry
                    .get(&config.general.provider)
                    .or_else(|| registry.default_provider())
                    .ok_or_else(|| kiln_core::Error::provider_not_configured(&config.general.provider))?
            }
        };

        let history = self
            .history
            .unwrap_or_else(|| Arc::new(JsonFileHistory::from_config(&config)));

        let modes = ModeRegistry::new(self.behaviors.unwrap_or_else(default_behaviors));
        modes.load_map(&config.modes);
        let modes = Arc::new(modes);

        let executor = Arc::new(ActionExecutor::from_config(&config.executor));
        executor.set_observer(Arc::new(IdleHandler::new(body.clone(), modes.clone())));

        let commands = Arc::new(self.commands.unwrap_or_default());

        let mut prompter = Prompter::new(provider, name.clone(), commands.docs())
            .with_model(config.general.model.clone());
        if let Some(ref template) = config.general.system_prompt {
            prompter = prompter.with_template(template.clone());
        }

        let scheduler = ModeScheduler::new(
            modes.clone(),
            executor.clone(),
            world.clone(),
            body.clone(),
            skills.clone(),
        )
        .with_config(&config.scheduler);

        let ctx = Arc::new(AgentContext::new(
            name, world, body, skills, executor, modes, history, config,
        ));
        let dispatch = DispatchLoop::new(
            ctx.clone(),
            Arc::new(prompter),
            commands,
            self.event_handler.clone(),
        );

        Ok(Agent {
            ctx,
            dispatch,
            scheduler: Arc::new(scheduler),
            events: self.event_handler,
            scheduler_task: Mutex::new(None),
        })
    }
}

// ============================================================================
// Agent
// ============================================================================

/// One running game-world agent.
pub struct Agent {
    ctx: Arc<AgentContext>,
    dispatch: DispatchLoop,
    scheduler: Arc<ModeScheduler>,
    events: Arc<dyn AgentEventHandler>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    pub fn builder(config: Config) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    pub fn scheduler(&self) -> &Arc<ModeScheduler> {
        &self.scheduler
    }

    pub fn dispatch(&self) -> &DispatchLoop {
        &self.dispatch
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load memory, start the mode scheduler and handle the init message.
    pub async fn start(&self) -> AgentResult<()> {
        if self.ctx.config.session.load_memory {
            let loaded = self.ctx.history.load().await?;
            info!(agent = %self.ctx.name, turns = loaded, "Loaded conversation history");
        }

        {
            let mut task = self.scheduler_task.lock();
            if task.is_some() {
                return Err(AgentError::AlreadyStarted(self.ctx.name.clone()));
            }
            let scheduler = self.scheduler.clone();
            let cancel = self.ctx.shutdown_token();
            *task = Some(tokio::spawn(async move { scheduler.run(cancel).await }));
        }
        info!(agent = %self.ctx.name, "Agent started");

        if let Some(init) = self.ctx.config.session.init_message.clone() {
            self.dispatch.handle_message(SYSTEM_SPEAKER, &init).await;
        }
        Ok(())
    }

    /// Handle a chat line.
    ///
    /// Returns `None` when the line was not dispatched: operator keywords,
    /// filtered lines, and chat that is recorded without being answered.
    pub async fn handle_chat(&self, source: &str, message: &str) -> Option<DispatchReport> {
        let session = &self.ctx.config.session;

        if session.stop_keyword.as_deref() == Some(message) {
            info!(source = %source, "Operator stop");
            if let Err(e) = self.ctx.history.persist().await {
                warn!(error = %e, "Failed to persist history");
            }
            self.ctx.request_shutdown();
            return None;
        }
        if session.clear_keyword.as_deref() == Some(message) {
            info!(source = %source, "Operator cleared history");
            self.ctx.history.clear().await;
            self.ctx.say("History cleared.");
            return None;
        }

        if source == self.ctx.name {
            return None;
        }
        if session
            .ignore_prefixes
            .iter()
            .any(|prefix| message.starts_with(prefix.as_str()))
        {
            debug!(source = %source, "Ignoring server notice");
            return None;
        }

        if !session.address_keywords.is_empty() {
            let mentions = |text: &str| {
                session
                    .address_keywords
                    .iter()
                    .any(|keyword| text.contains(keyword.as_str()))
            };
            if mentions(source) {
                debug!(source = %source, "Ignoring peer agent");
                return None;
            }
            if !mentions(message) {
                debug!(source = %source, "Recording unaddressed chat");
                self.ctx.history.append(source, message).await;
                return None;
            }
        }

        info!(source = %source, message = %message, "Received message");
        Some(self.dispatch.handle_message(source, message).await)
    }

    /// The agent died: drop whatever it was doing and tell the model.
    pub async fn on_death(&self, message: &str) {
        warn!(agent = %self.ctx.name, message = %message, "Agent died");
        self.ctx.executor.cancel_resume();
        self.ctx.executor.stop().await;
        self.ctx
            .history
            .append(
                SYSTEM_SPEAKER,
                &format!(
                    "You died with the final message: '{}'. Previous actions were stopped and you \
                     have respawned. Notify the user and perform any necessary actions.",
                    message
                ),
            )
            .await;
        self.events.on_death(message);
    }

    /// Clean shutdown: record why, save history, stop acting and end the scheduler.
    pub async fn shutdown(&self, reason: &str) -> AgentResult<()> {
        info!(agent = %self.ctx.name, reason = %reason, "Shutting down");
        self.ctx.history.append(SYSTEM_SPEAKER, reason).await;
        let persisted = self.ctx.history.persist().await;

        self.ctx.executor.cancel_resume();
        self.ctx.executor.stop().await;
        self.ctx.shutdown_token().cancel();

        let task = self.scheduler_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Mode scheduler task failed");
            }
        }

        self.events.on_shutdown(reason);
        persisted.map_err(AgentError::from)
    }

    /// Resolves once shutdown or a restart has been requested.
    pub async fn wait_for_shutdown(&self) {
        self.ctx.shutdown_token().cancelled().await;
    }

    pub fn restart_requested(&self) -> bool {
        self.ctx.restart_requested()
    }
}
