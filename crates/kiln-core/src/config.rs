//! Configuration system for Kiln.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Main configuration struct for Kiln.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Game server connection settings
    pub server: ServerConfig,
    /// Mode scheduler and dispatch loop settings
    pub scheduler: SchedulerConfig,
    /// Action executor settings
    pub executor: ExecutorConfig,
    /// Conversation/session settings
    pub session: SessionConfig,
    /// Mode on/off overrides, keyed by mode name
    pub modes: BTreeMap<String, bool>,
    /// Provider configurations
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// In-game name of the agent
    pub name: String,
    /// Default model to use
    pub model: String,
    /// Default provider
    pub provider: String,
    /// Optional system prompt template override ($NAME and $COMMAND_DOCS are substituted)
    pub system_prompt: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: "andy".to_string(),
            model: "deepseek-chat".to_string(),
            provider: "deepseek".to_string(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Game server host
    pub host: String,
    /// Game server port
    pub port: u16,
    /// Authentication scheme: offline, mojang, microsoft
    pub auth: String,
    /// Game protocol version
    pub game_version: String,
}

impl ServerConfig {
    /// `host:port` of the game server.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25565,
            auth: "offline".to_string(),
            game_version: "1.20.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the mode tick loop in milliseconds
    pub tick_interval_ms: u64,
    /// Upper bound on model/command iterations per conversational turn
    pub max_dispatch_iterations: usize,
    /// Restart the last resumable action when the agent goes idle
    pub auto_resume: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 300,
            max_dispatch_iterations: 5,
            auto_resume: false,
        }
    }
}

impl SchedulerConfig {
    /// Tick interval as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How long a cancelled action may keep running before it is aborted
    pub cancel_grace_ms: u64,
    /// Timeout for long collection actions in minutes (-1 disables it)
    pub code_timeout_mins: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cancel_grace_ms: 500,
            code_timeout_mins: 10,
        }
    }
}

impl ExecutorConfig {
    /// Grace period given to cancelled actions.
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Timeout for long-running collection commands, `None` when disabled.
    pub fn code_timeout(&self) -> Option<Duration> {
        if self.code_timeout_mins < 0 {
            None
        } else {
            Some(Duration::from_secs(self.code_timeout_mins as u64 * 60))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Load the persisted history on start
    pub load_memory: bool,
    /// Maximum number of turns kept in the history
    pub max_history: usize,
    /// Message handled as if sent by `system` once the agent starts
    pub init_message: Option<String>,
    /// Inbound chat lines starting with any of these are ignored (server notices)
    pub ignore_prefixes: Vec<String>,
    /// When non-empty, only chat containing one of these words is answered;
    /// other chat is only recorded. Speakers whose name contains one are
    /// peer agents and are ignored.
    pub address_keywords: Vec<String>,
    /// Operator line that saves history and shuts the agent down
    pub stop_keyword: Option<String>,
    /// Operator line that clears the conversation history
    pub clear_keyword: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            load_memory: false,
            max_history: 40,
            init_message: None,
            ignore_prefixes: vec![
                "Set own game mode to".to_string(),
                "Set the time to".to_string(),
                "Set the difficulty to".to_string(),
                "Teleported ".to_string(),
                "Set the weather to".to_string(),
                "Gamerule ".to_string(),
            ],
            address_keywords: Vec::new(),
            stop_keyword: Some("clerk-stop".to_string()),
            clear_keyword: Some("clerk-clear".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Default provider to use
    pub default_provider: Option<String>,
    /// DeepSeek configuration (OpenAI-compatible)
    pub deepseek: Option<ProviderConfig>,
    /// OpenAI configuration
    pub openai: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: Option<String>,
    /// Default model for this provider
    pub default_model: Option<String>,
    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key from either direct value or environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        None
    }
}

/// Result of configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Issues found during validation
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// True when there are no error-level issues.
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Error).collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Warning).collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "scheduler.tick_interval_ms")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        let config_dir = Self::config_dir();

        Self::figment(config_dir.join("config.toml")).extract()
    }

    /// Load configuration with an explicit user config file.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, figment::Error> {
        Self::figment(path.into()).extract()
    }

    fn figment(user_config: PathBuf) -> Figment {
        Figment::new()
            .merge(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(user_config))
            .merge(Toml::file(".kiln/config.toml"))
            // Local overrides (gitignored)
            .merge(Toml::file(".kiln/config.local.toml"))
            .merge(Env::prefixed("KILN_").split("__"))
    }

    /// Validate an already-loaded configuration, logging warnings.
    pub fn into_validated(self) -> Result<Self, Error> {
        let result = self.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.general.name.trim().is_empty() {
            result.add_error("general.name", "Agent name cannot be empty");
        }

        if self.general.model.is_empty() {
            result.add_error("general.model", "Model name cannot be empty");
        }

        if self.scheduler.tick_interval_ms == 0 {
            result.add_error("scheduler.tick_interval_ms", "tick_interval_ms must be greater than 0");
        }

        if self.scheduler.tick_interval_ms > 5_000 {
            result.add_warning(
                "scheduler.tick_interval_ms",
                "tick interval above 5s makes reactive modes sluggish",
            );
        }

        if self.scheduler.max_dispatch_iterations == 0 {
            result.add_error(
                "scheduler.max_dispatch_iterations",
                "max_dispatch_iterations must be greater than 0",
            );
        }

        if self.executor.code_timeout_mins == 0 || self.executor.code_timeout_mins < -1 {
            result.add_error(
                "executor.code_timeout_mins",
                "code_timeout_mins must be positive, or -1 to disable",
            );
        }

        if self.session.max_history == 0 {
            result.add_error("session.max_history", "max_history must be greater than 0");
        }

        if self.server.host.trim().is_empty() {
            result.add_error("server.host", "Game server host cannot be empty");
        }

        if self.server.port == 0 {
            result.add_error("server.port", "port must be greater than 0");
        }

        if self.server.game_version.trim().is_empty() {
            result.add_warning("server.game_version", "No game version set, the server's will be used");
        }

        if self.session.address_keywords.iter().any(|k| k.trim().is_empty()) {
            result.add_error(
                "session.address_keywords",
                "An empty address keyword would match every message",
            );
        }

        let valid_auth = ["offline", "mojang", "microsoft"];
        if !valid_auth.contains(&self.server.auth.as_str()) {
            result.add_error(
                "server.auth",
                format!("Invalid auth '{}'. Valid values: {:?}", self.server.auth, valid_auth),
            );
        }

        for (field, provider) in [
            ("providers.deepseek", &self.providers.deepseek),
            ("providers.openai", &self.providers.openai),
        ] {
            let Some(provider) = provider else { continue };
            if provider.api_key.as_ref().map(|k| k.is_empty()).unwrap_or(false) {
                result.add_warning(format!("{field}.api_key"), "API key is empty string");
            }
            if let Some(ref base_url) = provider.base_url {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    result.add_error(
                        format!("{field}.base_url"),
                        "base_url must start with http:// or https://",
                    );
                }
            }
        }

        result
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("kiln"))
            .unwrap_or_else(|| PathBuf::from("~/.config/kiln"))
    }

    /// Get the data directory (histories, etc.).
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("kiln"))
            .unwrap_or_else(|| PathBuf::from("~/.local/share/kiln"))
    }
}
