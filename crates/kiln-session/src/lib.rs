//! # kiln-session
//!
//! Conversation history persistence for Kiln.
//!
//! This crate provides:
//! - The [`HistoryStore`] collaborator trait used by the dispatch loop
//! - A bounded in-memory store
//! - A JSON snapshot store under `~/.local/share/kiln/bots/{name}/history.json`

pub mod store;

pub use store::{HistoryStore, InMemoryHistory, JsonFileHistory, Result, StoreError};
