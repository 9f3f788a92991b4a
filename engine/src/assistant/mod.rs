//! Conversation Client
//!
//! Thin, side-effecting façade over the remote assistant service. The
//! orchestrator only ever talks to the [`ConversationApi`] trait, which keeps
//! it drivable by a scripted fake in tests and leaves room for other backends.
//!
//! None of these calls wait or retry internally: one method, one round trip.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{ConversationId, RunAttempt, RunId};

pub mod openai;

pub use openai::OpenAIThreadsClient;

/// Result type for conversation operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Remote operations the run orchestrator needs.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Creates a conversation seeded with the first user message.
    async fn create_conversation(&self, first_message: &str) -> Result<ConversationId>;

    /// Appends a user message to an existing conversation.
    async fn append_message(&self, conversation: &ConversationId, text: &str) -> Result<()>;

    /// Starts an assistant run against the conversation.
    async fn start_run(&self, conversation: &ConversationId) -> Result<RunId>;

    /// Fetches the current state of a run. Must be polled by the caller.
    async fn get_run_status(&self, conversation: &ConversationId, run: &RunId)
        -> Result<RunAttempt>;

    /// Most recent assistant-authored message produced by `run`.
    ///
    /// `Ok(None)` means the service answered but had no assistant message,
    /// which is different from the call failing.
    async fn latest_assistant_message(
        &self,
        conversation: &ConversationId,
        run: &RunId,
    ) -> Result<Option<String>>;

    /// Asks the service to stop a run that is still executing.
    async fn cancel_run(&self, conversation: &ConversationId, run: &RunId) -> Result<()>;
}
