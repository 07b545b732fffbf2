//! Chat commands.
//!
//! A command is a named handler with a typed parameter list, invoked from
//! chat or model output as `!name arg1 arg2`. Action commands move the body
//! and always go through the executor; query commands only read the world.

mod actions;
mod parse;
mod queries;

pub use actions::action_commands;
pub use parse::{find_command, split_args, CommandToken, RawArg};
pub use queries::query_commands;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::AgentContext;

// ============================================================================
// Parameters & Arguments
// ============================================================================

/// Type of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Bool,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
        }
    }
}

/// Declared parameter of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

/// A parsed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    String(String),
    Number(f64),
    Bool(bool),
}

/// Parsed arguments, in parameter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<ArgValue>);

impl Args {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String argument at `index`, empty if absent or of another type.
    pub fn str(&self, index: usize) -> &str {
        match self.0.get(index) {
            Some(ArgValue::String(s)) => s,
            _ => "",
        }
    }

    pub fn number(&self, index: usize) -> f64 {
        match self.0.get(index) {
            Some(ArgValue::Number(n)) => *n,
            _ => 0.0,
        }
    }

    /// Number argument rounded to a non-negative count.
    pub fn count(&self, index: usize) -> u32 {
        self.number(index).round().clamp(0.0, u32::MAX as f64) as u32
    }

    pub fn boolean(&self, index: usize) -> bool {
        matches!(self.0.get(index), Some(ArgValue::Bool(true)))
    }
}

fn parse_value(raw: &str, kind: ParamKind) -> Option<ArgValue> {
    match kind {
        ParamKind::String => Some(ArgValue::String(raw.to_string())),
        ParamKind::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(ArgValue::Number),
        ParamKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(ArgValue::Bool(true)),
            "false" | "off" | "no" | "0" => Some(ArgValue::Bool(false)),
            _ => None,
        },
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a command invocation could not be run. The text is fed back to the
/// conversation so the model can correct itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command {0} does not exist.")]
    Unknown(String),

    #[error("Command {command} was given {given} args, but requires {expected} args.")]
    WrongArgCount {
        command: String,
        given: usize,
        expected: usize,
    },

    #[error("Error: Param '{param}' of {command} must be a {kind}.")]
    InvalidArg {
        command: String,
        param: &'static str,
        kind: ParamKind,
    },
}

// ============================================================================
// Command contract
// ============================================================================

/// A chat command.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name including the leading `!`.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn params(&self) -> &[Param] {
        &[]
    }

    /// Run the command. The returned text, if any, is reported back to the conversation.
    async fn perform(&self, ctx: Arc<AgentContext>, args: Args) -> Option<String>;
}

type Handler = Arc<dyn Fn(Arc<AgentContext>, Args) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// A command backed by an async closure.
pub struct FnCommand {
    name: &'static str,
    description: &'static str,
    params: Vec<Param>,
    handler: Handler,
}

impl FnCommand {
    pub fn new<F, Fut>(name: &'static str, description: &'static str, handler: F) -> Self
    where
        F: Fn(Arc<AgentContext>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        Self {
            name,
            description,
            params: Vec::new(),
            handler: Arc::new(move |ctx, args| handler(ctx, args).boxed()),
        }
    }

    /// Declare the next parameter.
    pub fn param(mut self, name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        self.params.push(Param {
            name,
            kind,
            description,
        });
        self
    }
}

#[async_trait]
impl Command for FnCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    async fn perform(&self, ctx: Arc<AgentContext>, args: Args) -> Option<String> {
        (self.handler)(ctx, args).await
    }
}

// ============================================================================
// Registry
// ============================================================================

/// A located and resolved command invocation.
pub struct Invocation {
    pub command: Arc<dyn Command>,
    /// Text before the command token, trimmed.
    pub prefix: String,
    pub args: Args,
}

/// The set of commands an agent understands.
pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
    index: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registry with every built-in action and query.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for command in action_commands().into_iter().chain(query_commands()) {
            registry.register(command);
        }
        registry
    }

    /// Register a command, replacing any command with the same name.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name();
        match self.index.get(name) {
            Some(&i) => {
                warn!(command = %name, "Replacing existing command");
                self.commands[i] = command;
            }
            None => {
                self.index.insert(name, self.commands.len());
                self.commands.push(command);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.index.get(name).map(|&i| self.commands[i].clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.iter().map(|c| c.name())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Cut `text` right after the first command and its declared arguments.
    ///
    /// Text without a command is returned unchanged. For an unknown command
    /// the cut is made right after the token.
    pub fn truncate<'a>(&self, text: &'a str) -> &'a str {
        let Some(token) = find_command(text) else {
            return text;
        };
        let arity = self.get(token.name).map(|c| c.params().len()).unwrap_or(0);
        let rest = &text[token.end..];
        let end = split_args(rest, arity)
            .last()
            .map(|arg| token.end + arg.end)
            .unwrap_or(token.end);
        &text[..end]
    }

    /// Locate the first command in `text` and parse its arguments.
    pub fn parse(&self, text: &str) -> Option<Result<Invocation, CommandError>> {
        let token = find_command(text)?;
        let Some(command) = self.get(token.name) else {
            return Some(Err(CommandError::Unknown(token.name.to_string())));
        };

        let params = command.params();
        let raw = split_args(&text[token.end..], params.len());
        if raw.len() < params.len() {
            return Some(Err(CommandError::WrongArgCount {
                command: token.name.to_string(),
                given: raw.len(),
                expected: params.len(),
            }));
        }

        let mut values = Vec::with_capacity(params.len());
        for (param, arg) in params.iter().zip(&raw) {
            match parse_value(&arg.value, param.kind) {
                Some(value) => values.push(value),
                None => {
                    return Some(Err(CommandError::InvalidArg {
                        command: token.name.to_string(),
                        param: param.name,
                        kind: param.kind,
                    }))
                }
            }
        }

        Some(Ok(Invocation {
            command,
            prefix: text[..token.start].trim().to_string(),
            args: Args::new(values),
        }))
    }

    /// Parse and run the first command in `text`.
    ///
    /// Parse failures come back as correction text rather than errors.
    pub async fn execute(&self, ctx: Arc<AgentContext>, text: &str) -> Option<String> {
        match self.parse(text)? {
            Ok(invocation) => {
                debug!(command = %invocation.command.name(), args = ?invocation.args, "Executing command");
                invocation.command.perform(ctx, invocation.args).await
            }
            Err(e) => {
                debug!(error = %e, "Rejected command");
                Some(e.to_string())
            }
        }
    }

    /// Documentation block listing every command, for the system prompt.
    pub fn docs(&self) -> String {
        let mut docs = String::from(
            "\n*COMMAND DOCS\n You can use the following commands to perform actions and get \
             information about the world.\n Use the commands with the syntax: !commandName or \
             !commandName arg1 arg2 ... if the command takes arguments. Wrap an argument that \
             contains spaces in double quotes.\n You can only use one command in each response.\n",
        );
        for command in &self.commands {
            docs.push_str(&format!("{}: {}\n", command.name(), command.description()));
            if !command.params().is_empty() {
                docs.push_str("Params:\n");
                for param in command.params() {
                    docs.push_str(&format!(
                        "{}: ({}) {}\n",
                        param.name, param.kind, param.description
                    ));
                }
            }
        }
        docs.push_str("*\n");
        docs
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(
            FnCommand::new("!goToPlayer", "Go to the given player.", |_, _| async { None })
                .param("player_name", ParamKind::String, "The name of the player to go to.")
                .param("closeness", ParamKind::Number, "How close to get to the player."),
        ));
        registry.register(Arc::new(
            FnCommand::new("!setMode", "Toggle a mode.", |_, _| async { None })
                .param("mode_name", ParamKind::String, "Mode.")
                .param("on", ParamKind::Bool, "Whether to enable."),
        ));
        registry.register(Arc::new(FnCommand::new("!stop", "Stop.", |_, _| async {
            Some("Agent stopped.".to_string())
        })));
        registry
    }

    #[test]
    fn test_truncate_keeps_declared_args() {
        let registry = registry();
        assert_eq!(
            registry.truncate("Sure! !goToPlayer Bob 3 extra trailing text"),
            "Sure! !goToPlayer Bob 3"
        );
        assert_eq!(registry.truncate("Okay. !stop now please"), "Okay. !stop");
        assert_eq!(registry.truncate("just chatting"), "just chatting");
        assert_eq!(registry.truncate("!unknownThing with args"), "!unknownThing");
    }

    #[test]
    fn test_parse_arguments() {
        let registry = registry();
        let invocation = registry
            .parse("Sure! !goToPlayer Bob 3 extra trailing text")
            .unwrap()
            .unwrap();
        assert_eq!(invocation.command.name(), "!goToPlayer");
        assert_eq!(invocation.prefix, "Sure!");
        assert_eq!(invocation.args.str(0), "Bob");
        assert_eq!(invocation.args.number(1), 3.0);
        assert_eq!(invocation.args.len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        let registry = registry();
        assert_eq!(
            registry.parse("!doesNotExist").unwrap().err(),
            Some(CommandError::Unknown("!doesNotExist".into()))
        );
        assert_eq!(
            registry.parse("!goToPlayer Bob").unwrap().err(),
            Some(CommandError::WrongArgCount {
                command: "!goToPlayer".into(),
                given: 1,
                expected: 2
            })
        );
        let invalid = registry.parse("!goToPlayer Bob close").unwrap().err().unwrap();
        assert_eq!(
            invalid.to_string(),
            "Error: Param 'closeness' of !goToPlayer must be a number."
        );
        assert!(registry.parse("no command here").is_none());
    }

    #[test]
    fn test_bool_values() {
        let registry = registry();
        let on = registry.parse("!setMode hunting on").unwrap().unwrap();
        assert!(on.args.boolean(1));
        let off = registry.parse("!setMode hunting false").unwrap().unwrap();
        assert!(!off.args.boolean(1));
        assert!(registry.parse("!setMode hunting maybe").unwrap().is_err());
    }

    #[test]
    fn test_count_rounding() {
        let args = Args::new(vec![ArgValue::Number(2.6), ArgValue::Number(-4.0)]);
        assert_eq!(args.count(0), 3);
        assert_eq!(args.count(1), 0);
        assert_eq!(args.str(0), "");
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = CommandRegistry::with_builtins();
        for name in [
            "!stop",
            "!restart",
            "!clearChat",
            "!setMode",
            "!goToPlayer",
            "!followPlayer",
            "!moveAway",
            "!givePlayer",
            "!collectBlocks",
            "!collectAllBlocks",
            "!craftRecipe",
            "!smeltItem",
            "!placeHere",
            "!attack",
            "!goToBed",
            "!activate",
            "!stay",
            "!tpa",
            "!tpaccept",
            "!storeItems",
            "!stats",
            "!inventory",
            "!nearbyBlocks",
            "!craftable",
            "!entities",
            "!modes",
        ] {
            assert!(registry.exists(name), "missing {}", name);
        }
        let docs = registry.docs();
        assert!(docs.contains("!goToPlayer: "));
        assert!(docs.contains("closeness: (number) "));
    }
}
