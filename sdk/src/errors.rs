//! Error types and handling
//!
//! This module provides the error types used throughout the Ava engine.
//! Remote failures keep the raw response body; [`remote_message`] pulls the
//! human-readable message out of it.

use std::time::Duration;
use thiserror::Error;

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: missing credential or target id, invalid values
/// - **Remote**: any non-success response from the assistant service
/// - **Run**: remote-reported run failure, completed run without an answer
/// - **Persistence**: thread registry could not be written
/// - **Transport**: network failures, undecodable bodies, poll deadline,
///   cancellation
///
/// # Examples
///
/// ```
/// use sdk::errors::EngineError;
///
/// let error = EngineError::Remote {
///     status: 429,
///     body: r#"{"error": {"message": "Rate limit reached"}}"#.to_string(),
/// };
/// assert_eq!(error.status(), Some(429));
/// assert_eq!(error.remote_message(), "Rate limit reached");
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Remote service errors
    #[error("Remote error (HTTP {status}): {}", remote_message(.body))]
    Remote { status: u16, body: String },

    // Run errors
    #[error("Run failed: {reason}")]
    RunFailed { reason: String },

    #[error("Run completed but no assistant message was found")]
    NoAnswerFound,

    // Local persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Transport errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response body: {0}")]
    Parse(String),

    #[error("Run did not finish within {0:?}")]
    PollTimeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Human-readable message for a remote failure.
    ///
    /// For `Remote` errors this digs the `message` field out of the JSON
    /// error body; every other variant falls back to its `Display` text.
    pub fn remote_message(&self) -> String {
        match self {
            Self::Remote { body, .. } => remote_message(body),
            other => other.to_string(),
        }
    }

    /// HTTP status of a remote failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Extracts the message from a remote JSON error body.
///
/// Accepts both `{"error": {"message": ..}}` and `{"message": ..}`. A body that
/// is not JSON is returned trimmed; an empty body becomes "Unknown error".
pub fn remote_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .get("error")
            .and_then(|e| e.get("message"))
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}
