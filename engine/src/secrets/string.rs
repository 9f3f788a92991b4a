//! Credential wrapper.

use std::fmt;

/// An API key or bot token.
///
/// Formatting never shows the value: `{}` prints `[REDACTED]` and `{:?}`
/// prints `SecretString([REDACTED])`. Request builders read it through
/// [`SecretString::unsecure`] when they set an authorization header.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    /// Wraps `value`, dropping the surrounding whitespace a pasted or piped
    /// token usually carries.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.len() == value.len() {
            Self { value }
        } else {
            Self {
                value: trimmed.to_string(),
            }
        }
    }

    /// The raw credential.
    pub fn unsecure(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
