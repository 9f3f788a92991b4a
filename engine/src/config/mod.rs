//! Configuration management
//!
//! This module handles loading, validation, and management of the Ava configuration.
//! Configuration is stored in TOML format at ~/.ava/config.toml and can be
//! overridden from the environment, which is how the bot is usually deployed.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **assistant**: Remote assistant service endpoint and identity
//! - **orchestrator**: Attempt budget, poll interval, optional poll deadline
//! - **chat**: Allow-list, message size limit, command prefix
//! - **registry**: Location of the channel → conversation mapping file
//!
//! # Environment Overrides
//!
//! | Variable            | Field                          |
//! |---------------------|--------------------------------|
//! | `ASSISTANT_ID`      | `assistant.assistant_id`       |
//! | `OPENAI_ORG_ID`     | `assistant.organization_id`    |
//! | `OPENAI_BASE_URL`   | `assistant.base_url`           |
//! | `ALLOWED_CHANNELS`  | `chat.allowed_channels` (comma-separated) |
//! | `AVA_MESSAGE_LIMIT` | `chat.message_limit`           |
//! | `AVA_LOG_LEVEL`     | `core.log_level`               |
//!
//! Credentials are never read from this file; see [`crate::secrets`].
//!
//! # Examples
//!
//! ```no_run
//! use ava_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Registry file: {:?}", config.registry_path());
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted `poll_deadline_secs` (one week)
pub const MAX_POLL_DEADLINE_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted `poll_interval_ms` (one hour)
pub const MAX_POLL_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Remote assistant service settings
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Run orchestration settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Chat transport settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Thread registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Remote assistant service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Base URL of the assistant REST API
    #[serde(default = "default_assistant_base_url")]
    pub base_url: String,

    /// Assistant that runs are started against
    #[serde(default)]
    pub assistant_id: String,

    /// Organization header value; omitted from requests when unset
    #[serde(default)]
    pub organization_id: Option<String>,

    /// API version tag sent in the `OpenAI-Beta` header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    // Note: API key stored in environment or OS keychain, not in config
}

/// Run orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Total run attempts per request
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between two run status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before starting the next attempt after a failed one
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Give up polling a run after this long. Unset means poll until the run
    /// reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_deadline_secs: Option<u64>,
}

/// Chat transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Channels allowed to use the bot; empty means every channel
    #[serde(default)]
    pub allowed_channels: Vec<String>,

    /// Hard size limit of one chat message, in characters
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,

    /// Prefix that turns a chat message into a question
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Base URL of the Discord REST API used to deliver replies
    #[serde(default = "default_discord_base_url")]
    pub discord_base_url: String,
}

/// Thread registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry file; defaults to `<data_dir>/threads.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.ava")
}

fn default_assistant_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_version() -> String {
    "assistants=v2".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_message_limit() -> usize {
    2000
}

fn default_command_prefix() -> String {
    "!ava".to_string()
}

fn default_discord_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: default_assistant_base_url(),
            assistant_id: String::new(),
            organization_id: None,
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            poll_deadline_secs: None,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            allowed_channels: Vec::new(),
            message_limit: default_message_limit(),
            command_prefix: default_command_prefix(),
            discord_base_url: default_discord_base_url(),
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_deadline(&self) -> Option<Duration> {
        self.poll_deadline_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.ava/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    /// Environment overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        let config = if config_path.exists() {
            Self::read_from_path(&config_path)?
        } else {
            Self::create_default(&config_path)?
        };

        config.finish(|key| std::env::var(key).ok())
    }

    /// Load configuration from a specific path, then apply environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        Self::read_from_path(path)?.finish(|key| std::env::var(key).ok())
    }

    /// Parse configuration from TOML text with an explicit environment lookup
    ///
    /// Used by tests and by callers that assemble the environment themselves.
    pub fn from_toml_str<F>(contents: &str, lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.finish(lookup)
    }

    fn read_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Wrote default configuration to {}", path.display());
        Ok(config)
    }

    /// Get the default configuration file path (~/.ava/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".ava").join("config.toml"))
    }

    fn finish<F>(mut self, lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_env_overrides(lookup)?;
        self.validate_and_process()?;
        Ok(self)
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(id) = get("ASSISTANT_ID") {
            self.assistant.assistant_id = id;
        }
        if let Some(org) = get("OPENAI_ORG_ID") {
            self.assistant.organization_id = Some(org);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.assistant.base_url = url;
        }
        if let Some(channels) = get("ALLOWED_CHANNELS") {
            self.chat.allowed_channels = parse_channel_list(&channels);
        }
        if let Some(limit) = get("AVA_MESSAGE_LIMIT") {
            self.chat.message_limit = limit.parse().map_err(|_| {
                EngineError::Config(format!("AVA_MESSAGE_LIMIT is not a number: '{}'", limit))
            })?;
        }
        if let Some(level) = get("AVA_LOG_LEVEL") {
            self.core.log_level = level;
        }

        Ok(())
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates value ranges
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        reqwest::Url::parse(&self.assistant.base_url).map_err(|e| {
            EngineError::Config(format!(
                "Invalid assistant base_url '{}': {}",
                self.assistant.base_url, e
            ))
        })?;
        reqwest::Url::parse(&self.chat.discord_base_url).map_err(|e| {
            EngineError::Config(format!(
                "Invalid discord_base_url '{}': {}",
                self.chat.discord_base_url, e
            ))
        })?;

        if self.chat.message_limit == 0 {
            return Err(EngineError::Config(
                "message_limit must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.max_attempts == 0 {
            return Err(EngineError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_POLL_INTERVAL_MS).contains(&self.orchestrator.poll_interval_ms) {
            return Err(EngineError::Config(format!(
                "poll_interval_ms must be between 1 and {}",
                MAX_POLL_INTERVAL_MS
            )));
        }
        if let Some(secs) = self.orchestrator.poll_deadline_secs {
            if !(1..=MAX_POLL_DEADLINE_SECS).contains(&secs) {
                return Err(EngineError::Config(format!(
                    "poll_deadline_secs must be between 1 and {} when set",
                    MAX_POLL_DEADLINE_SECS
                )));
            }
        }

        self.chat.allowed_channels.retain(|c| !c.trim().is_empty());

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if let Some(path) = &self.registry.path {
            self.registry.path = Some(expand_path(path)?);
        }

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// Assistant id, required by any operation that starts a run
    pub fn assistant_id(&self) -> Result<&str, EngineError> {
        let id = self.assistant.assistant_id.trim();
        if id.is_empty() {
            return Err(EngineError::Config(
                "No assistant configured. Set ASSISTANT_ID or [assistant].assistant_id".to_string(),
            ));
        }
        Ok(id)
    }

    /// Location of the thread registry file
    pub fn registry_path(&self) -> PathBuf {
        self.registry
            .path
            .clone()
            .unwrap_or_else(|| self.core.data_dir.join("threads.json"))
    }
}

/// Parse a comma-separated channel list, skipping blanks
pub fn parse_channel_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
