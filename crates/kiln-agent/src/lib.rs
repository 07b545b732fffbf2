//! # kiln-agent
//!
//! Agent orchestration for Kiln.
//!
//! This crate provides:
//! - A serialized, preemptible action executor
//! - Reactive modes and the interrupt-priority scheduler that drives them
//! - The chat command set
//! - The conversation-to-action dispatch loop
//! - Agent assembly and lifecycle

pub mod agent;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod executor;
pub mod modes;
pub mod prompter;
pub mod scheduler;

pub use agent::{Agent, AgentBuilder, AgentError, AgentEventHandler, AgentResult, NoOpEventHandler};
pub use commands::{Command, CommandError, CommandRegistry, FnCommand, ParamKind};
pub use context::{clean_chat, AgentContext, IdleHandler};
pub use dispatch::{DispatchLoop, DispatchReport};
pub use executor::{
    ActionExecutor, ActionOutcome, ExecutorObserver, ExecutorSnapshot, GeneratingGuard, NoOpObserver,
    ResumableAction,
};
pub use modes::{Behavior, InterruptScope, Mode, ModeAction, ModeContext, ModeRegistry};
pub use prompter::{Prompter, APOLOGY};
pub use scheduler::{is_eligible, ModeScheduler};
