//! Configuration loading, validation, and management for BlockMind.
//!
//! Loads configuration from `~/.blockmind/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Per-agent settings (name, model, prompt templates, examples) live in a
//! separate JSON [`Profile`].

pub mod profile;

pub use profile::{Profile, ProfileError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.blockmind/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used when a profile doesn't name one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Where per-agent state lives (`<data_dir>/<name>/...`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Whether `!newAction` may stage and run model-written action scripts
    #[serde(default)]
    pub allow_insecure_coding: bool,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub modes: ModesConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("bots")
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("data_dir", &self.data_dir)
            .field("allow_insecure_coding", &self.allow_insecure_coding)
            .field("providers", &self.providers)
            .field("history", &self.history)
            .field("executor", &self.executor)
            .field("conversation", &self.conversation)
            .field("modes", &self.modes)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// Conversation buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Buffer length that triggers eviction into the memory summary
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

/// Action executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Watchdog timeout for generated actions
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: u64,

    /// Output longer than this is shortened to head and tail
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    #[serde(default = "default_stop_poll_ms")]
    pub stop_poll_ms: u64,

    /// How long `stop()` waits before tearing the process down
    #[serde(default = "default_stop_ceiling_secs")]
    pub stop_ceiling_secs: u64,

    /// How long the watchdog waits after its own stop before tearing down
    #[serde(default = "default_watchdog_grace_secs")]
    pub watchdog_grace_secs: u64,

    /// Model round trips allowed in one `!newAction`
    #[serde(default = "default_max_code_iterations")]
    pub max_code_iterations: usize,
}

fn default_timeout_minutes() -> u64 {
    10
}
fn default_max_output_chars() -> usize {
    500
}
fn default_stop_poll_ms() -> u64 {
    1000
}
fn default_stop_ceiling_secs() -> u64 {
    10
}
fn default_watchdog_grace_secs() -> u64 {
    5
}
fn default_max_code_iterations() -> usize {
    5
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: default_timeout_minutes(),
            max_output_chars: default_max_output_chars(),
            stop_poll_ms: default_stop_poll_ms(),
            stop_ceiling_secs: default_stop_ceiling_secs(),
            watchdog_grace_secs: default_watchdog_grace_secs(),
            max_code_iterations: default_max_code_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Model round trips allowed per inbound message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Server chatter that should never reach the model
    #[serde(default = "default_ignored_prefixes")]
    pub ignored_prefixes: Vec<String>,
}

fn default_max_iterations() -> usize {
    5
}
fn default_ignored_prefixes() -> Vec<String> {
    vec![
        "Set own game mode to".into(),
        "Set the time to".into(),
        "Set the difficulty to".into(),
        "Teleported ".into(),
        "Set the weather to".into(),
        "Gamerule ".into(),
    ]
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            ignored_prefixes: default_ignored_prefixes(),
        }
    }
}

/// Behavior scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModesConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Behaviors switched off at startup
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn default_tick_ms() -> u64 {
    300
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            disabled: vec![],
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.blockmind/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `BLOCKMIND_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("BLOCKMIND_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("BLOCKMIND_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("BLOCKMIND_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".blockmind")
    }

    /// The per-agent state directory.
    pub fn agent_dir(&self, agent_name: &str) -> PathBuf {
        self.data_dir.join(agent_name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.history.max_messages < 2 {
            return Err(ConfigError::ValidationError(
                "history.max_messages must be at least 2".into(),
            ));
        }
        let executor = &self.executor;
        if executor.max_output_chars == 0
            || executor.stop_poll_ms == 0
            || executor.stop_ceiling_secs == 0
            || executor.watchdog_grace_secs == 0
            || executor.max_code_iterations == 0
        {
            return Err(ConfigError::ValidationError(
                "executor limits must be greater than 0".into(),
            ));
        }
        if self.conversation.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_iterations must be greater than 0".into(),
            ));
        }
        if self.modes.tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "modes.tick_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            data_dir: default_data_dir(),
            allow_insecure_coding: false,
            providers: HashMap::new(),
            history: HistoryConfig::default(),
            executor: ExecutorConfig::default(),
            conversation: ConversationConfig::default(),
            modes: ModesConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
