//! TOML Configuration File Support
//!
//! Centralized configuration loading for the chat core, with an optional
//! TOML file at `~/.config/relay-chat/chat.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [relay]
//! kind = "managed"
//!
//! [socket]
//! url = "wss://backend.buildpicoapps.com/api/chatbot/chat"
//! app_id = "animal-rate"
//!
//! [managed]
//! base_url = "https://generativelanguage.googleapis.com"
//! api_key = "..."
//!
//! [models.reasoning]
//! model = "gemini-3-flash-preview"
//! temperature = 0.7
//! thinking_budget = 16000
//!
//! [chat]
//! system_prompt = "Keep answers short."
//! greeting = "Hello! How can I help?"
//! default_variant = "reasoning"
//! stream_timeout_secs = 60
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{
    ManagedRelayConfig, ModelProfile, SocketRelayConfig, DEFAULT_APP_ID, DEFAULT_MANAGED_URL,
    DEFAULT_SOCKET_URL,
};
use crate::controller::ControllerConfig;
use crate::messages::ModelVariant;

/// Built-in system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful support assistant. \
Keep answers short, clear and professional.";

/// Built-in greeting shown before the first submission
pub const DEFAULT_GREETING: &str = "Welcome! How can I help you today?";

/// Default idle timeout in seconds
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the effective configuration last came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Which relay implementation to build
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    /// WebSocket chat proxy
    #[default]
    Socket,
    /// Managed `streamGenerateContent` call
    Managed,
}

impl RelayKind {
    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Managed => "managed",
        }
    }
}

impl std::fmt::Display for RelayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "socket" | "ws" | "websocket" => Ok(Self::Socket),
            "managed" | "gemini" | "sdk" => Ok(Self::Managed),
            other => Err(format!("unknown relay kind '{other}'")),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[relay]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// `socket` or `managed`
    pub kind: Option<String>,
}

/// `[socket]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketToml {
    /// Proxy endpoint
    pub url: Option<String>,
    /// Application identifier
    pub app_id: Option<String>,
}

/// `[managed]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedToml {
    /// API base URL
    pub base_url: Option<String>,
    /// API key
    pub api_key: Option<String>,
}

/// One `[models.*]` table; unset keys keep the built-in profile
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileToml {
    /// Model name
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Thinking token budget (0 disables)
    pub thinking_budget: Option<u32>,
}

/// `[models]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsToml {
    /// FAST profile
    pub fast: ProfileToml,
    /// REASONING profile
    pub reasoning: ProfileToml,
}

/// `[chat]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// System prompt sent with every exchange
    pub system_prompt: Option<String>,
    /// Bootstrap greeting (empty string disables it)
    pub greeting: Option<String>,
    /// `fast` or `reasoning`
    pub default_variant: Option<String>,
    /// Idle timeout between fragments in seconds (0 = none)
    pub stream_timeout_secs: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfigToml {
    /// Relay selection
    pub relay: RelayToml,
    /// Socket relay settings
    pub socket: SocketToml,
    /// Managed relay settings
    pub managed: ManagedToml,
    /// Model profiles
    pub models: ModelsToml,
    /// Conversation settings
    pub chat: ChatToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration for a chat session
///
/// Use [`load_config`] to resolve it from all sources, then
/// [`ConfigOverrides::apply`] for command-line values.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Relay implementation
    pub relay: RelayKind,

    /// Socket proxy endpoint
    pub socket_url: String,

    /// Socket application identifier
    pub app_id: String,

    /// Managed API base URL
    pub managed_base_url: String,

    /// Managed API key
    pub api_key: String,

    /// FAST model profile
    pub fast: ModelProfile,

    /// REASONING model profile
    pub reasoning: ModelProfile,

    /// System prompt
    pub system_prompt: String,

    /// Greeting turn content (`None` = no greeting)
    pub greeting: Option<String>,

    /// Variant selected at start-up
    pub default_variant: ModelVariant,

    /// Idle timeout between fragments (`None` = wait forever)
    pub stream_timeout: Option<Duration>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            relay: RelayKind::Socket,
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            managed_base_url: DEFAULT_MANAGED_URL.to_string(),
            api_key: String::new(),
            fast: ModelProfile::fast(),
            reasoning: ModelProfile::reasoning(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: Some(DEFAULT_GREETING.to_string()),
            default_variant: ModelVariant::Fast,
            stream_timeout: Some(Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS)),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChatConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Settings for [`crate::backend::SocketRelay`]
    pub fn socket_relay_config(&self) -> SocketRelayConfig {
        SocketRelayConfig {
            url: self.socket_url.clone(),
            app_id: self.app_id.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }

    /// Settings for [`crate::backend::ManagedRelay`]
    pub fn managed_relay_config(&self) -> ManagedRelayConfig {
        ManagedRelayConfig {
            base_url: self.managed_base_url.clone(),
            api_key: self.api_key.clone(),
            system_prompt: self.system_prompt.clone(),
            fast: self.fast.clone(),
            reasoning: self.reasoning.clone(),
            ..ManagedRelayConfig::default()
        }
    }

    /// Settings for [`crate::controller::ConversationController`]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            greeting: self.greeting.clone(),
            variant: self.default_variant,
            stream_timeout: self.stream_timeout,
        }
    }

    /// Check value ranges the type system cannot express
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, profile) in [("fast", &self.fast), ("reasoning", &self.reasoning)] {
            if profile.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "models.{name}.model must not be empty"
                )));
            }
            if !(0.0..=2.0).contains(&profile.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "models.{name}.temperature must be between 0.0 and 2.0, got {}",
                    profile.temperature
                )));
            }
        }

        let url = match self.relay {
            RelayKind::Socket => &self.socket_url,
            RelayKind::Managed => &self.managed_base_url,
        };
        if url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} relay URL must not be empty",
                self.relay
            )));
        }

        if self.relay == RelayKind::Managed && self.api_key.is_empty() {
            tracing::warn!("Managed relay selected without an API key");
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/relay-chat/chat.toml` or
/// `~/.config/relay-chat/chat.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("relay-chat").join("chat.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or a
/// value is invalid. A missing config file is not an error.
pub fn load_config() -> Result<ChatConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChatConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment values through `env`
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ChatConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ChatConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChatConfigToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;
    config.validate()?;

    Ok(config)
}

fn parse_kind(value: &str) -> Result<RelayKind, ConfigError> {
    value.parse().map_err(ConfigError::ValidationError)
}

fn parse_variant(value: &str) -> Result<ModelVariant, ConfigError> {
    value.parse().map_err(ConfigError::ValidationError)
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn greeting_from(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn apply_profile(profile: &mut ModelProfile, toml: &ProfileToml) {
    if let Some(model) = &toml.model {
        profile.model = model.clone();
    }
    if let Some(temperature) = toml.temperature {
        profile.temperature = temperature;
    }
    if let Some(budget) = toml.thinking_budget {
        profile.thinking_budget = (budget > 0).then_some(budget);
    }
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChatConfig, toml: &ChatConfigToml) -> Result<(), ConfigError> {
    if let Some(kind) = &toml.relay.kind {
        config.relay = parse_kind(kind)?;
    }

    if let Some(url) = &toml.socket.url {
        config.socket_url = url.clone();
    }
    if let Some(app_id) = &toml.socket.app_id {
        config.app_id = app_id.clone();
    }

    if let Some(base_url) = &toml.managed.base_url {
        config.managed_base_url = base_url.clone();
    }
    if let Some(api_key) = &toml.managed.api_key {
        config.api_key = api_key.clone();
    }

    apply_profile(&mut config.fast, &toml.models.fast);
    apply_profile(&mut config.reasoning, &toml.models.reasoning);

    if let Some(prompt) = &toml.chat.system_prompt {
        config.system_prompt = prompt.clone();
    }
    if let Some(greeting) = &toml.chat.greeting {
        config.greeting = greeting_from(greeting.clone());
    }
    if let Some(variant) = &toml.chat.default_variant {
        config.default_variant = parse_variant(variant)?;
    }
    if let Some(secs) = toml.chat.stream_timeout_secs {
        config.stream_timeout = timeout_from_secs(secs);
    }

    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ChatConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(kind) = env("CHAT_RELAY") {
        config.relay = parse_kind(&kind)?;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("CHAT_SOCKET_URL") {
        config.socket_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(app_id) = env("CHAT_APP_ID") {
        config.app_id = app_id;
        config.source = ConfigSource::Env;
    }
    if let Some(base_url) = env("CHAT_MANAGED_URL") {
        config.managed_base_url = base_url;
        config.source = ConfigSource::Env;
    }
    if let Some(api_key) = env("GEMINI_API_KEY").or_else(|| env("API_KEY")) {
        config.api_key = api_key;
        config.source = ConfigSource::Env;
    }
    if let Some(prompt) = env("CHAT_SYSTEM_PROMPT") {
        config.system_prompt = prompt;
        config.source = ConfigSource::Env;
    }
    if let Some(greeting) = env("CHAT_GREETING") {
        config.greeting = greeting_from(greeting);
        config.source = ConfigSource::Env;
    }
    if let Some(variant) = env("CHAT_VARIANT") {
        config.default_variant = parse_variant(&variant)?;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("CHAT_STREAM_TIMEOUT") {
        let secs = timeout.trim().parse::<u64>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "CHAT_STREAM_TIMEOUT must be a whole number of seconds, got '{timeout}'"
            ))
        })?;
        config.stream_timeout = timeout_from_secs(secs);
        config.source = ConfigSource::Env;
    }

    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Relay kind override
    pub relay: Option<RelayKind>,

    /// Socket URL override
    pub socket_url: Option<String>,

    /// Managed base URL override
    pub managed_base_url: Option<String>,

    /// Variant override
    pub variant: Option<ModelVariant>,

    /// Stream timeout override in seconds (0 = none)
    pub stream_timeout_secs: Option<u64>,

    /// Drop the greeting turn
    pub no_greeting: bool,
}

impl ConfigOverrides {
    /// Create an empty override set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the relay kind
    #[must_use]
    pub fn with_relay(mut self, relay: RelayKind) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Override the socket URL
    #[must_use]
    pub fn with_socket_url(mut self, url: String) -> Self {
        self.socket_url = Some(url);
        self
    }

    /// Override the managed base URL
    #[must_use]
    pub fn with_managed_base_url(mut self, url: String) -> Self {
        self.managed_base_url = Some(url);
        self
    }

    /// Override the start-up variant
    #[must_use]
    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Override the stream timeout
    #[must_use]
    pub fn with_stream_timeout_secs(mut self, secs: u64) -> Self {
        self.stream_timeout_secs = Some(secs);
        self
    }

    /// Start without a greeting turn
    #[must_use]
    pub fn without_greeting(mut self) -> Self {
        self.no_greeting = true;
        self
    }

    fn is_empty(&self) -> bool {
        self.relay.is_none()
            && self.socket_url.is_none()
            && self.managed_base_url.is_none()
            && self.variant.is_none()
            && self.stream_timeout_secs.is_none()
            && !self.no_greeting
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ChatConfig) {
        if self.is_empty() {
            return;
        }

        if let Some(relay) = self.relay {
            config.relay = relay;
        }
        if let Some(url) = &self.socket_url {
            config.socket_url = url.clone();
        }
        if let Some(url) = &self.managed_base_url {
            config.managed_base_url = url.clone();
        }
        if let Some(variant) = self.variant {
            config.default_variant = variant;
        }
        if let Some(secs) = self.stream_timeout_secs {
            config.stream_timeout = timeout_from_secs(secs);
        }
        if self.no_greeting {
            config.greeting = None;
        }

        config.source = ConfigSource::Cli;
    }
}
