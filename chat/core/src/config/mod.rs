//! TOML Configuration File Support
//!
//! Layered configuration for the chat pipeline, read from
//! `~/.config/chat-stream/config.toml`.
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
//! [endpoint]
//! base_url = "https://chat.example.com"
//! chat_path = "/api/chat"
//! timeout_secs = 120
//! connect_timeout_secs = 10
//! api_token = "sk-..."
//!
//! [session]
//! model = "gpt-4o-mini"
//! stream = true
//! default_title = "New Conversation"
//! title_from_message = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest title derived from a first message, in characters
pub const MAX_TITLE_CHARS: usize = 50;

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

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
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

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[endpoint]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// Base URL of the chat service
    pub base_url: Option<String>,

    /// Path of the chat route
    pub chat_path: Option<String>,

    /// Idle timeout in seconds (headers, then each body chunk)
    pub timeout_secs: Option<u64>,

    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,

    /// Bearer token
    pub api_token: Option<String>,
}

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Model for new conversations
    pub model: Option<String>,

    /// Request streamed responses
    pub stream: Option<bool>,

    /// Title of a new conversation
    pub default_title: Option<String>,

    /// Derive the title from the first message
    pub title_from_message: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Endpoint section
    pub endpoint: EndpointToml,

    /// Session section
    pub session: SessionToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Where and how to reach the chat endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base URL (scheme, host, port)
    pub base_url: String,
    /// Path of the chat route
    pub chat_path: String,
    /// Bearer token attached by the transport
    pub api_token: Option<String>,
    /// Longest wait for response headers or for the next body chunk
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            chat_path: "/api/chat".to_string(),
            api_token: None,
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Defaults applied to sends
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Model for new conversations
    pub model: String,
    /// Request streamed responses
    pub stream: bool,
    /// Title of a new conversation
    pub default_title: String,
    /// Derive the title from the first message
    pub title_from_message: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            stream: true,
            default_title: "New Conversation".to_string(),
            title_from_message: true,
        }
    }
}

impl SessionConfig {
    /// Title for a conversation created by sending `message`
    #[must_use]
    pub fn title_for(&self, message: &str) -> String {
        let trimmed = message.trim();
        if !self.title_from_message || trimmed.is_empty() {
            return self.default_title.clone();
        }
        trimmed.chars().take(MAX_TITLE_CHARS).collect()
    }
}

/// Centralized configuration
///
/// Use [`load_config`] to load with priority handling, then
/// [`ConfigOverrides::apply`] for command-line values.
#[derive(Clone, Debug, Default)]
pub struct ChatConfig {
    /// Endpoint configuration
    pub endpoint: EndpointConfig,

    /// Session defaults
    pub session: SessionConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Highest-priority source that contributed a value
    source: ConfigSource,
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

    /// Check the resolved values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a base URL that is not
    /// http(s) or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.endpoint.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::ValidationError(
                "endpoint.base_url is empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "endpoint.base_url must start with http:// or https://, got {url}"
            )));
        }
        if self.endpoint.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "endpoint.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.endpoint.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "endpoint.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.session.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "session.model is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chat-stream/config.toml` or the platform
/// equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-stream").join("config.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ChatConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChatConfig, ConfigError> {
    let mut config = ChatConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChatToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
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

    apply_env_config(&mut config);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChatConfig, toml: &ChatToml) {
    let endpoint = &toml.endpoint;
    if let Some(ref url) = endpoint.base_url {
        config.endpoint.base_url.clone_from(url);
    }
    if let Some(ref path) = endpoint.chat_path {
        config.endpoint.chat_path.clone_from(path);
    }
    if let Some(secs) = endpoint.timeout_secs {
        config.endpoint.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = endpoint.connect_timeout_secs {
        config.endpoint.connect_timeout = Duration::from_secs(secs);
    }
    if endpoint.api_token.is_some() {
        config.endpoint.api_token.clone_from(&endpoint.api_token);
    }

    let session = &toml.session;
    if let Some(ref model) = session.model {
        config.session.model.clone_from(model);
    }
    if let Some(stream) = session.stream {
        config.session.stream = stream;
    }
    if let Some(ref title) = session.default_title {
        config.session.default_title.clone_from(title);
    }
    if let Some(enabled) = session.title_from_message {
        config.session.title_from_message = enabled;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ChatConfig) {
    apply_env_with(config, |key| std::env::var(key).ok());
}

fn apply_env_with(config: &mut ChatConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("CHAT_BASE_URL") {
        config.endpoint.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(path) = lookup("CHAT_PATH") {
        config.endpoint.chat_path = path;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = lookup("CHAT_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.endpoint.timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %timeout, "Ignoring non-numeric CHAT_TIMEOUT_SECS");
        }
    }
    if let Some(token) = lookup("CHAT_API_TOKEN") {
        config.endpoint.api_token = Some(token);
        config.source = ConfigSource::Env;
    }
    if let Some(model) = lookup("CHAT_MODEL") {
        config.session.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(stream) = lookup("CHAT_STREAM") {
        config.session.stream = stream != "0" && stream.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// Streaming override
    pub stream: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set streaming override
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ChatConfig) {
        if self.base_url.is_some() || self.model.is_some() || self.stream.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.endpoint.base_url.clone_from(url);
        }
        if let Some(ref model) = self.model {
            config.session.model.clone_from(model);
        }
        if let Some(stream) = self.stream {
            config.session.stream = stream;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
