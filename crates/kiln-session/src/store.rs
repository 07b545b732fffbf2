//! Conversation history storage.
//!
//! The history is append-only from the agent's point of view and bounded:
//! once `max_history` turns are held, the oldest turn is dropped for every
//! new one. Two stores are provided: [`InMemoryHistory`] for tests and
//! ephemeral sessions, and [`JsonFileHistory`] which snapshots the window to
//! `{data_dir}/bots/{name}/history.json`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use kiln_core::{Config, Turn};

/// Errors that can occur in history store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("History file belongs to '{found}', expected '{expected}'")]
    NameMismatch { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// History collaborator used by the dispatch loop.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a turn. The role is derived from the speaker.
    async fn append(&self, speaker: &str, text: &str);

    /// Current window, oldest first.
    async fn snapshot(&self) -> Vec<Turn>;

    /// Write the window to durable storage. No-op for in-memory stores.
    async fn persist(&self) -> Result<()>;

    /// Restore a previously persisted window. Returns the number of turns loaded.
    async fn load(&self) -> Result<usize>;

    /// Forget every turn.
    async fn clear(&self);
}

/// Bounded turn window shared by both stores.
#[derive(Debug)]
struct Window {
    agent_name: String,
    max_turns: usize,
    turns: VecDeque<Turn>,
}

impl Window {
    fn new(agent_name: impl Into<String>, max_turns: usize) -> Self {
        Self {
            agent_name: agent_name.into(),
            max_turns: max_turns.max(1),
            turns: VecDeque::new(),
        }
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    fn replace(&mut self, turns: Vec<Turn>) {
        self.turns.clear();
        for turn in turns {
            self.push(turn);
        }
    }
}

/// History kept only in memory.
#[derive(Debug)]
pub struct InMemoryHistory {
    window: Mutex<Window>,
}

impl InMemoryHistory {
    pub fn new(agent_name: impl Into<String>, max_turns: usize) -> Self {
        Self {
            window: Mutex::new(Window::new(agent_name, max_turns)),
        }
    }

    /// Number of turns currently held.
    pub fn len(&self) -> usize {
        self.window.lock().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, speaker: &str, text: &str) {
        let mut window = self.window.lock();
        let turn = Turn::new(&window.agent_name, speaker, text);
        window.push(turn);
    }

    async fn snapshot(&self) -> Vec<Turn> {
        self.window.lock().turns.iter().cloned().collect()
    }

    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<usize> {
        Ok(0)
    }

    async fn clear(&self) {
        self.window.lock().turns.clear();
    }
}

/// On-disk layout of a saved history.
#[derive(Debug, Serialize, Deserialize)]
struct SavedHistory {
    name: String,
    saved_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

/// History persisted as a JSON snapshot.
#[derive(Debug)]
pub struct JsonFileHistory {
    path: PathBuf,
    window: Mutex<Window>,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>, agent_name: impl Into<String>, max_turns: usize) -> Self {
        Self {
            path: path.into(),
            window: Mutex::new(Window::new(agent_name, max_turns)),
        }
    }

    /// Store at the default location for the configured agent.
    pub fn from_config(config: &Config) -> Self {
        let path = Self::default_path(&Config::data_dir(), &config.general.name);
        Self::new(path, &config.general.name, config.session.max_history)
    }

    /// `{data_dir}/bots/{name}/history.json`
    pub fn default_path(data_dir: &Path, agent_name: &str) -> PathBuf {
        data_dir.join("bots").join(agent_name).join("history.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistory {
    async fn append(&self, speaker: &str, text: &str) {
        let mut window = self.window.lock();
        let turn = Turn::new(&window.agent_name, speaker, text);
        window.push(turn);
    }

    async fn snapshot(&self) -> Vec<Turn> {
        self.window.lock().turns.iter().cloned().collect()
    }

    async fn persist(&self) -> Result<()> {
        let saved = {
            let window = self.window.lock();
            SavedHistory {
                name: window.agent_name.clone(),
                saved_at: Utc::now(),
                turns: window.turns.iter().cloned().collect(),
            }
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling file first so a crash never leaves a torn snapshot.
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(&saved)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), turns = saved.turns.len(), "Persisted history");
        Ok(())
    }

    async fn load(&self) -> Result<usize> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved history");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let saved: SavedHistory = serde_json::from_slice(&bytes)?;
        let mut window = self.window.lock();
        if saved.name != window.agent_name {
            warn!(expected = %window.agent_name, found = %saved.name, "Refusing foreign history file");
            return Err(StoreError::NameMismatch {
                expected: window.agent_name.clone(),
                found: saved.name,
            });
        }

        window.replace(saved.turns);
        let loaded = window.turns.len();
        info!(path = %self.path.display(), turns = loaded, "Loaded history");
        Ok(loaded)
    }

    async fn clear(&self) {
        self.window.lock().turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_window_is_bounded() {
        let history = InMemoryHistory::new("andy", 3);
        for i in 0..5 {
            history.append("Bob", &format!("message {}", i)).await;
        }

        let turns = history.snapshot().await;
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text, "message 2");
        assert_eq!(turns[2].text, "message 4");
    }

    #[tokio::test]
    async fn test_roles_follow_speaker() {
        let history = InMemoryHistory::new("andy", 10);
        history.append("Bob", "hi").await;
        history.append("andy", "hello").await;
        history.append("system", "Agent stopped.").await;

        let roles: Vec<Role> = history.snapshot().await.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::System]);
    }

    #[tokio::test]
    async fn test_clear() {
        let history = InMemoryHistory::new("andy", 10);
        history.append("Bob", "hi").await;
        history.clear().await;
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_json_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let path = JsonFileHistory::default_path(dir.path(), "andy");

        let history = JsonFileHistory::new(&path, "andy", 10);
        history.append("Bob", "collect some wood").await;
        history.append("andy", "On it! !collectBlocks oak_log 10").await;
        history.persist().await.unwrap();
        assert!(path.exists());

        let restored = JsonFileHistory::new(&path, "andy", 10);
        assert_eq!(restored.load().await.unwrap(), 2);
        let turns = restored.snapshot().await;
        assert_eq!(turns[0].speaker, "Bob");
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let history = JsonFileHistory::new(dir.path().join("nope.json"), "andy", 10);
        assert_eq!(history.load().await.unwrap(), 0);
        assert!(history.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_respects_bound() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let big = JsonFileHistory::new(&path, "andy", 10);
        for i in 0..8 {
            big.append("Bob", &i.to_string()).await;
        }
        big.persist().await.unwrap();

        let small = JsonFileHistory::new(&path, "andy", 4);
        assert_eq!(small.load().await.unwrap(), 4);
        assert_eq!(small.snapshot().await[0].text, "4");
    }

    #[tokio::test]
    async fn test_load_rejects_other_agent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let andy = JsonFileHistory::new(&path, "andy", 10);
        andy.append("Bob", "hi").await;
        andy.persist().await.unwrap();

        let other = JsonFileHistory::new(&path, "randy", 10);
        assert!(matches!(
            other.load().await,
            Err(StoreError::NameMismatch { .. })
        ));
    }
}
