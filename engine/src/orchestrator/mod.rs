//! Run Orchestrator
//!
//! Turns one question into one answer against a channel's conversation:
//!
//! 1. Resolve the channel's conversation, creating and binding it on first
//!    use (the question becomes the conversation's first message).
//! 2. For an existing conversation, append the question.
//! 3. Run the attempt loop: start a run, poll it to a terminal state, fetch
//!    the run's assistant message and strip its citation markers.
//!
//! Creation and append failures abort immediately; they usually mean a bad
//! credential or id. Only the run phase (start, poll, fetch) is retried, and
//! the question is never appended twice.
//!
//! Every remote call races the caller's cancellation token, so a cancelled
//! request stops at once instead of waiting out the HTTP timeout.
//!
//! Each run moves through `NotStarted -> Queued -> InProgress -> Completed |
//! Failed`; see [`RunPhase`].

pub mod poll;
pub mod retry;

pub use poll::{poll_until, PollControl, PollSettings};
pub use retry::{AttemptOutcome, RetryError, RetryPolicy};

use crate::assistant::ConversationApi;
use crate::chunker::clean_citations;
use crate::config::OrchestratorConfig;
use crate::registry::ThreadRegistry;
use crate::secrets::scrub;
use sdk::errors::EngineError;
use sdk::types::{ChannelId, ConversationId, RunAttempt, RunId, RunStatus};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a run stands from the orchestrator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<RunStatus> for RunPhase {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Queued => Self::Queued,
            RunStatus::Completed => Self::Completed,
            RunStatus::Failed
            | RunStatus::Cancelled
            | RunStatus::Expired
            | RunStatus::Incomplete => Self::Failed,
            RunStatus::InProgress
            | RunStatus::RequiresAction
            | RunStatus::Cancelling
            | RunStatus::Unknown => Self::InProgress,
        }
    }
}

/// Timing and budget of an orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub retry: RetryPolicy,
    pub poll: PollSettings,
}

impl OrchestratorSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.max_attempts, config.retry_delay()),
            poll: PollSettings::new(config.poll_interval(), config.poll_deadline()),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

/// A successful orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub conversation_id: ConversationId,
    pub run_id: RunId,
    /// Answer with citation markers removed.
    pub text: String,
    /// Attempts used, starting at 1.
    pub attempts: u32,
}

/// Why an orchestration produced no answer.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("failed to create conversation: {0}")]
    CreateConversation(#[source] EngineError),

    #[error("failed to append message to {conversation_id}: {source}")]
    AppendMessage {
        conversation_id: ConversationId,
        #[source]
        source: EngineError,
    },

    #[error("no answer after {attempts} attempt(s): {last}")]
    AttemptsExhausted { attempts: u32, last: EngineError },

    #[error("request aborted after {attempts} attempt(s): {error}")]
    Aborted { attempts: u32, error: EngineError },
}

impl OrchestrationError {
    /// The underlying engine error.
    pub fn engine_error(&self) -> &EngineError {
        match self {
            Self::CreateConversation(e) => e,
            Self::AppendMessage { source, .. } => source,
            Self::AttemptsExhausted { last, .. } => last,
            Self::Aborted { error, .. } => error,
        }
    }

    /// Single reply posted back to the chat when a request fails.
    ///
    /// Remote messages and run failure reasons are surfaced verbatim, minus
    /// anything that looks like a secret.
    pub fn user_message(&self) -> String {
        let message = match self {
            Self::CreateConversation(e) => {
                format!("Could not create the conversation: {}", e.remote_message())
            }
            Self::AppendMessage { source, .. } => {
                format!("Could not send your question: {}", source.remote_message())
            }
            Self::AttemptsExhausted { last, .. } => match last {
                EngineError::RunFailed { reason } => format!("Run failed: {}", reason),
                EngineError::Remote { .. } => {
                    format!("The assistant service failed: {}", last.remote_message())
                }
                other => format!("No answer: {}", other),
            },
            Self::Aborted { error, .. } => match error {
                EngineError::Cancelled => "The request was cancelled.".to_string(),
                other => format!("Request aborted: {}", other),
            },
        };
        scrub(&message)
    }
}

pub struct Orchestrator {
    api: Arc<dyn ConversationApi>,
    registry: Arc<ThreadRegistry>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn ConversationApi>,
        registry: Arc<ThreadRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            api,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Answers `question` in `channel`'s conversation.
    pub async fn ask(
        &self,
        channel: &ChannelId,
        question: &str,
    ) -> Result<Answer, OrchestrationError> {
        self.ask_with_cancel(channel, question, &CancellationToken::new())
            .await
    }

    /// Like [`ask`](Self::ask), stopping early when `cancel` fires.
    pub async fn ask_with_cancel(
        &self,
        channel: &ChannelId,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer, OrchestrationError> {
        let conversation = self.prepare_conversation(channel, question, cancel).await?;

        let result = self
            .settings
            .retry
            .run(cancel, |attempt| {
                self.run_attempt(&conversation, cancel, attempt)
            })
            .await;

        match result {
            Ok(((run_id, text), attempts)) => {
                info!(
                    "Answered in {} on attempt {} (run {})",
                    conversation, attempts, run_id
                );
                Ok(Answer {
                    conversation_id: conversation,
                    run_id,
                    text,
                    attempts,
                })
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                Err(OrchestrationError::AttemptsExhausted { attempts, last })
            }
            Err(RetryError::Fatal { attempt, error }) => Err(OrchestrationError::Aborted {
                attempts: attempt,
                error,
            }),
        }
    }

    /// Steps 1 and 2: the conversation that now holds `question`.
    async fn prepare_conversation(
        &self,
        channel: &ChannelId,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<ConversationId, OrchestrationError> {
        if let Some(conversation) = self.registry.resolve(channel).await {
            debug!("Channel {} uses conversation {}", channel, conversation);
            cancellable(cancel, self.api.append_message(&conversation, question))
                .await
                .map_err(|source| match source {
                    EngineError::Cancelled => aborted_before_run(),
                    source => OrchestrationError::AppendMessage {
                        conversation_id: conversation.clone(),
                        source,
                    },
                })?;
            return Ok(conversation);
        }

        let conversation = cancellable(cancel, self.api.create_conversation(question))
            .await
            .map_err(|e| match e {
                EngineError::Cancelled => aborted_before_run(),
                e => OrchestrationError::CreateConversation(e),
            })?;
        info!("Created conversation {} for channel {}", conversation, channel);

        // Losing the file write must not lose the conversation.
        if let Err(e) = self.registry.bind(channel, &conversation).await {
            warn!(
                "Continuing with unsaved mapping {} -> {}: {}",
                channel, conversation, e
            );
        }

        Ok(conversation)
    }

    /// One start-poll-fetch cycle.
    async fn run_attempt(
        &self,
        conversation: &ConversationId,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> AttemptOutcome<(RunId, String)> {
        let mut phase = RunPhase::NotStarted;
        debug!("Attempt {} on {}: {:?}", attempt, conversation, phase);

        let run = match cancellable(cancel, self.api.start_run(conversation)).await {
            Ok(run) => run,
            Err(e) => return classify(e),
        };
        phase = RunPhase::Queued;
        debug!("Attempt {} run {}: {:?}", attempt, run, phase);

        let settled = match self.poll_run(conversation, &run, cancel).await {
            Ok(settled) => settled,
            Err(e) => {
                if matches!(e, EngineError::PollTimeout(_) | EngineError::Cancelled) {
                    self.cancel_quietly(conversation, &run).await;
                }
                return classify(e);
            }
        };
        phase = RunPhase::from(settled.status);
        debug!("Attempt {} run {}: {:?}", attempt, run, phase);

        if phase == RunPhase::Failed {
            let reason = settled
                .last_error
                .unwrap_or_else(|| format!("run ended as {}", settled.status));
            return AttemptOutcome::Retryable(EngineError::RunFailed { reason });
        }

        match cancellable(cancel, self.api.latest_assistant_message(conversation, &run)).await {
            Ok(Some(raw)) => {
                // An answer made only of citation markers is no answer.
                let text = clean_citations(&raw);
                if text.trim().is_empty() {
                    AttemptOutcome::Retryable(EngineError::NoAnswerFound)
                } else {
                    AttemptOutcome::Success((run, text))
                }
            }
            Ok(None) => AttemptOutcome::Retryable(EngineError::NoAnswerFound),
            Err(e) => classify(e),
        }
    }

    async fn poll_run(
        &self,
        conversation: &ConversationId,
        run: &RunId,
        cancel: &CancellationToken,
    ) -> Result<RunAttempt, EngineError> {
        let api = &self.api;

        poll_until(self.settings.poll, cancel, move || async move {
            let attempt = api.get_run_status(conversation, run).await?;
            debug!("Run {} status: {}", run, attempt.status);

            Ok(if RunPhase::from(attempt.status).is_terminal() {
                PollControl::Ready(attempt)
            } else {
                PollControl::Pending
            })
        })
        .await
    }

    async fn cancel_quietly(&self, conversation: &ConversationId, run: &RunId) {
        match self.api.cancel_run(conversation, run).await {
            Ok(()) => info!("Cancelled run {}", run),
            Err(e) => warn!("Could not cancel run {}: {}", run, e),
        }
    }
}

/// Awaits `call` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        result = call => result,
    }
}

/// Cancellation before the first run started.
fn aborted_before_run() -> OrchestrationError {
    OrchestrationError::Aborted {
        attempts: 0,
        error: EngineError::Cancelled,
    }
}

/// Run-phase errors are transient unless the caller asked us to stop.
fn classify<T>(error: EngineError) -> AttemptOutcome<T> {
    match error {
        EngineError::Cancelled => AttemptOutcome::Fatal(error),
        other => AttemptOutcome::Retryable(other),
    }
}
