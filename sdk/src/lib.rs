//! Ava SDK
//!
//! Shared error taxonomy and conversation types used by the engine and its tests.

/// Error types and handling
pub mod errors;

/// Channel, conversation and run types
pub mod types;

// Re-export commonly used types
pub use errors::EngineError;
pub use types::{ChannelId, ConversationId, RunAttempt, RunId, RunStatus};
