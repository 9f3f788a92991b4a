pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keychain key of the assistant service bearer credential
pub const OPENAI_API_KEY: &str = "openai_api_key";

/// Keychain key of the Discord bot token
pub const DISCORD_TOKEN: &str = "discord_token";

/// SecretManager resolves credentials from the environment or the OS keychain.
///
/// Lookup order for a key such as `openai_api_key`:
/// 1. Environment variable with the upper-cased key (`OPENAI_API_KEY`)
/// 2. OS keychain entry under this manager's service name
///
/// Secrets are stored in:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// The SecretManager also provides secret scrubbing functionality to remove
/// sensitive data from log output and chat replies.
pub struct SecretManager {
    service_name: String,
}

/// Regex patterns for detecting common secret formats.
/// These are compiled once and reused for performance.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - OpenAI API keys: sk-[a-zA-Z0-9-_]{20,}
/// - Discord bot tokens: three dot-separated base64url segments
/// - Authorization header values: (Bearer|Bot)\s+[^\s]{20,}
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            // Authorization header values first, so the scheme word goes too
            Regex::new(r"\b(?:Bearer|Bot)\s+[^\s]{20,}").expect("Invalid authorization pattern"),
            // OpenAI API keys, including sk-proj- and sk-svcacct- variants
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid OpenAI pattern"),
            // Discord bot tokens
            Regex::new(r"\b[A-Za-z0-9_\-]{23,28}\.[A-Za-z0-9_\-]{6,7}\.[A-Za-z0-9_\-]{27,}\b")
                .expect("Invalid Discord pattern"),
        ]
    })
}

impl SecretManager {
    /// Creates a new SecretManager with the given service name.
    ///
    /// The service name is used to namespace secrets in the OS keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Resolves a credential without ever prompting.
    ///
    /// # Errors
    /// - `EngineError::Config` if neither the environment nor the keychain has it
    /// - `EngineError::KeyringError` if keychain access itself fails
    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        let env_name = env_var_name(key);
        if let Some(secret) = std::env::var(&env_name)
            .ok()
            .map(SecretString::new)
            .filter(|s| !s.is_empty())
        {
            tracing::debug!("Using secret '{}' from ${}", key, env_name);
            return Ok(secret);
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password().map(SecretString::new) {
            Ok(secret) if !secret.is_empty() => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Ok(_) | Err(keyring::Error::NoEntry) => Err(EngineError::Config(format!(
                "Missing credential '{}'. Set ${} or run `ava secret set {}`",
                key, env_name, key
            ))),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::KeyringError(
                "Secret cannot be empty".to_string(),
            ));
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Deletes a secret from the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn delete_secret(&self, key: &str) -> Result<(), EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.delete_password().map_err(|e| {
            EngineError::KeyringError(format!("Failed to delete secret '{}': {}", key, e))
        })?;

        tracing::info!("Deleted secret '{}' from keychain", key);
        Ok(())
    }

    /// Where a secret would currently be resolved from, if anywhere.
    pub fn source_of(&self, key: &str) -> Option<SecretSource> {
        let from_env = std::env::var(env_var_name(key))
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if from_env {
            return Some(SecretSource::Environment);
        }

        let entry = Entry::new(&self.service_name, key).ok()?;
        entry.get_password().ok().map(|_| SecretSource::Keychain)
    }

    /// Checks if a secret is available without failing.
    pub fn has_secret(&self, key: &str) -> bool {
        self.source_of(key).is_some()
    }

    /// Scrubs secrets from text by replacing them with [REDACTED].
    ///
    /// Used on every failure message before it is posted to a channel and on
    /// remote bodies before they are logged.
    ///
    /// # Examples
    /// ```
    /// use ava_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("test");
    /// let scrubbed = manager.scrub("My API key is sk-1234567890abcdefghij");
    /// assert_eq!(scrubbed, "My API key is [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        scrub(text)
    }
}

/// Where a credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Environment,
    Keychain,
}

/// Environment variable consulted for a keychain key.
pub fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase()
}

/// Replaces every secret-looking substring with `[REDACTED]`.
pub fn scrub(text: &str) -> String {
    let patterns = get_secret_patterns();
    let mut result = text.to_string();

    for pattern in patterns {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}
