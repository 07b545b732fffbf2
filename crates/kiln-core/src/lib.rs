//! # kiln-core
//!
//! Core types and abstractions for Kiln, an autonomous game-world agent.
//!
//! This crate provides:
//! - Conversation primitives
//! - World, body and skill collaborator contracts
//! - Configuration system
//! - Common error types

pub mod config;
pub mod error;
pub mod message;
pub mod skill;
pub mod world;

pub use config::Config;
pub use error::{Error, ProviderError, Result};
pub use message::{Role, Turn, SYSTEM_SPEAKER};
pub use skill::{SkillResult, Skills};
pub use world::{Block, Body, DamageEvent, DamageTracker, Entity, EntityKind, Vec3, Weather, World};
