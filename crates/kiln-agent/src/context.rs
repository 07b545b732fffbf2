//! Per-session collaborator bundle.
//!
//! One [`AgentContext`] exists per agent. It is handed to the scheduler, the
//! dispatch loop and every command handler, so nothing in the crate relies
//! on process-wide singletons and several agents can share a runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiln_core::{Body, Config, Skills, World};
use kiln_session::HistoryStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::executor::{ActionExecutor, ExecutorObserver};
use crate::modes::ModeRegistry;

/// Everything a command or loop needs to act on behalf of one agent.
pub struct AgentContext {
    /// In-game name of the agent.
    pub name: String,
    pub world: Arc<dyn World>,
    pub body: Arc<dyn Body>,
    pub skills: Arc<dyn Skills>,
    pub executor: Arc<ActionExecutor>,
    pub modes: Arc<ModeRegistry>,
    pub history: Arc<dyn HistoryStore>,
    pub config: Arc<Config>,
    shutdown: CancellationToken,
    restart_requested: AtomicBool,
}

impl AgentContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        world: Arc<dyn World>,
        body: Arc<dyn Body>,
        skills: Arc<dyn Skills>,
        executor: Arc<ActionExecutor>,
        modes: Arc<ModeRegistry>,
        history: Arc<dyn HistoryStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            name,
            world,
            body,
            skills,
            executor,
            modes,
            history,
            config,
            shutdown: CancellationToken::new(),
            restart_requested: AtomicBool::new(false),
        }
    }

    /// Fires when the agent is asked to shut down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the surrounding process to shut the agent down.
    pub fn request_shutdown(&self) {
        info!(agent = %self.name, "Shutdown requested");
        self.shutdown.cancel();
    }

    /// Ask the surrounding process to restart the agent.
    pub fn request_restart(&self) {
        info!(agent = %self.name, "Restart requested");
        self.restart_requested.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::SeqCst)
    }

    /// Send a chat line, flattening newlines so it goes out as one message.
    pub fn say(&self, message: &str) {
        self.body.chat(&clean_chat(message));
    }
}

/// Multi-line chat is split by the server into several messages and trips
/// spam filters; newlines become double spaces instead.
pub fn clean_chat(message: &str) -> String {
    message.replace('\n', "  ")
}

/// Clears residual motion and un-pauses modes when the executor goes idle.
pub struct IdleHandler {
    body: Arc<dyn Body>,
    modes: Arc<ModeRegistry>,
}

impl IdleHandler {
    pub fn new(body: Arc<dyn Body>, modes: Arc<ModeRegistry>) -> Self {
        Self { body, modes }
    }
}

impl ExecutorObserver for IdleHandler {
    fn on_idle(&self) {
        self.body.clear_control_states();
        self.body.stop_pathing();
        self.modes.unpause_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_chat() {
        assert_eq!(clean_chat("Inventory\n- oak_log: 3\n"), "Inventory  - oak_log: 3  ");
        assert_eq!(clean_chat("plain"), "plain");
    }
}
