//! Attempt-bounded retry driver
//!
//! Each attempt reports a tagged [`AttemptOutcome`]; the policy alone decides
//! whether to try again, how long to wait and when to give up.

use sdk::errors::EngineError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    /// Worth another attempt if the budget allows.
    Retryable(EngineError),
    /// Stop immediately.
    Fatal(EngineError),
}

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: EngineError },

    #[error("attempt {attempt} failed: {error}")]
    Fatal { attempt: u32, error: EngineError },
}

impl RetryError {
    /// Number of attempts that were made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    /// The error that ended the retry loop.
    pub fn into_error(self) -> EngineError {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Drives `attempt` (called with the 1-based attempt number) until it
    /// succeeds, fails fatally or the budget runs out.
    ///
    /// Returns the value together with the number of attempts used. A
    /// cancellation during the inter-attempt delay ends the loop as a fatal
    /// `Cancelled`.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<(T, u32), RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let mut number = 1;

        loop {
            debug!("Attempt {}/{}", number, self.max_attempts);

            let error = match attempt(number).await {
                AttemptOutcome::Success(value) => return Ok((value, number)),
                AttemptOutcome::Fatal(error) => {
                    warn!("Attempt {} failed fatally: {}", number, error);
                    return Err(RetryError::Fatal {
                        attempt: number,
                        error,
                    });
                }
                AttemptOutcome::Retryable(error) => error,
            };

            if number >= self.max_attempts {
                warn!("Attempt {} failed, no attempts left: {}", number, error);
                return Err(RetryError::Exhausted {
                    attempts: number,
                    last: error,
                });
            }

            warn!(
                "Attempt {}/{} failed: {}; retrying in {:?}",
                number, self.max_attempts, error, self.delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Fatal {
                        attempt: number,
                        error: EngineError::Cancelled,
                    });
                }
                _ = tokio::time::sleep(self.delay) => {}
            }

            number += 1;
        }
    }
}
