//! Conversation-to-action dispatch.
//!
//! ```text
//! inbound chat
//!     │
//!     ├── contains !command ──► run it directly, broadcast the result
//!     │
//!     └── otherwise ──► history ──► prompter ──► reply
//!                          ▲                       │
//!                          │        command? ──────┤
//!                          │          │            └── no: say it, done
//!                          │          ▼
//!                          └── system turn ◄── execute
//! ```
//!
//! The conversational loop is bounded; an exhausted bound ends the turn
//! without any further message.

use std::sync::Arc;

use kiln_core::SYSTEM_SPEAKER;
use tracing::{debug, info, instrument, warn};

use crate::agent::AgentEventHandler;
use crate::commands::{find_command, CommandError, CommandRegistry};
use crate::context::AgentContext;
use crate::prompter::Prompter;

/// What happened while handling one inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Completions requested from the model.
    pub iterations: usize,
    /// Commands that were actually executed, in order.
    pub executed: Vec<String>,
}

/// Routes inbound messages to commands or to the model.
pub struct DispatchLoop {
    ctx: Arc<AgentContext>,
    prompter: Arc<Prompter>,
    commands: Arc<CommandRegistry>,
    events: Arc<dyn AgentEventHandler>,
    max_iterations: usize,
}

impl DispatchLoop {
    pub fn new(
        ctx: Arc<AgentContext>,
        prompter: Arc<Prompter>,
        commands: Arc<CommandRegistry>,
        events: Arc<dyn AgentEventHandler>,
    ) -> Self {
        let max_iterations = ctx.config.scheduler.max_dispatch_iterations.max(1);
        Self {
            ctx,
            prompter,
            commands,
            events,
            max_iterations,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Handle one message from `source`.
    #[instrument(skip(self, message), fields(agent = %self.ctx.name))]
    pub async fn handle_message(&self, source: &str, message: &str) -> DispatchReport {
        let report = match find_command(message) {
            Some(token) => self.run_direct(source, message, token.name).await,
            None => self.converse(source, message).await,
        };

        if let Err(e) = self.ctx.history.persist().await {
            warn!(error = %e, "Failed to persist history");
        }
        self.events.on_turn_finished(source, &report);
        report
    }

    /// A command typed by someone else runs without consulting the model.
    async fn run_direct(&self, source: &str, message: &str, name: &str) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !self.commands.exists(name) {
            self.ctx.say(&format!("Command '{}' does not exist.", name));
            return report;
        }

        self.ctx
            .say(&format!("*{} used {}*", source, name.trim_start_matches('!')));
        self.events.on_command(source, name);
        report.executed.push(name.to_string());

        if let Some(result) = self.commands.execute(self.ctx.clone(), message).await {
            self.ctx.say(&result);
            self.ctx.history.append(SYSTEM_SPEAKER, &result).await;
        }
        report
    }

    async fn converse(&self, source: &str, message: &str) -> DispatchReport {
        let mut report = DispatchReport::default();
        self.ctx.history.append(source, message).await;

        while report.iterations < self.max_iterations {
            report.iterations += 1;
            let turns = self.ctx.history.snapshot().await;

            let reply = {
                let _generating = self.ctx.executor.generating();
                self.prompter.prompt_convo(turns).await
            };

            let Some(token) = find_command(&reply) else {
                debug!(reply = %reply, "Pure dialogue response");
                self.ctx.history.append(&self.ctx.name, &reply).await;
                self.ctx.say(&reply);
                break;
            };

            let name = token.name.to_string();
            let truncated = self.commands.truncate(&reply);
            self.ctx.history.append(&self.ctx.name, truncated).await;

            if !self.commands.exists(&name) {
                warn!(command = %name, "Model produced an unknown command");
                let correction = CommandError::Unknown(name).to_string();
                self.ctx.history.append(SYSTEM_SPEAKER, &correction).await;
                continue;
            }

            let pre = truncated[..token.start].trim();
            let notice = format!("*used {}*", name.trim_start_matches('!'));
            if pre.is_empty() {
                self.ctx.say(&notice);
            } else {
                self.ctx.say(&format!("{}  {}", pre, notice));
            }

            self.events.on_command(&self.ctx.name, &name);
            let result = self.commands.execute(self.ctx.clone(), truncated).await;
            info!(command = %name, result = ?result, "Agent executed command");
            report.executed.push(name);

            match result {
                Some(result) => self.ctx.history.append(SYSTEM_SPEAKER, &result).await,
                None => break,
            }
        }

        report
    }
}
