//! Poll-until primitive
//!
//! Calls a check repeatedly with a fixed pause in between until it reports
//! `Ready`, the optional deadline passes, or the cancellation token fires.
//! The first check runs immediately.
//!
//! A deadline or interval too large to add to the clock is treated as no
//! deadline or as a wait for cancellation, respectively.

use sdk::errors::EngineError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Answer of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollControl<T> {
    Ready(T),
    Pending,
}

/// Timing of a poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` polls until the check is ready.
    pub deadline: Option<Duration>,
}

impl PollSettings {
    pub fn new(interval: Duration, deadline: Option<Duration>) -> Self {
        Self { interval, deadline }
    }
}

/// Runs `check` until it is ready.
///
/// # Errors
/// - whatever `check` returns, immediately
/// - `EngineError::PollTimeout` once `settings.deadline` has elapsed
/// - `EngineError::Cancelled` when `cancel` fires, including mid-sleep
pub async fn poll_until<T, F, Fut>(
    settings: PollSettings,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollControl<T>, EngineError>>,
{
    let started = Instant::now();
    let expires_at = settings.deadline.and_then(|d| started.checked_add(d));

    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let control = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            control = check() => control?,
        };

        if let PollControl::Ready(value) = control {
            return Ok(value);
        }

        let Some(wake_at) = Instant::now().checked_add(settings.interval) else {
            // Never wakes; only a deadline or cancellation ends the wait.
            if let Some(expires_at) = expires_at {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep_until(expires_at) => {}
                }
                return Err(EngineError::PollTimeout(started.elapsed()));
            }
            cancel.cancelled().await;
            return Err(EngineError::Cancelled);
        };
        if let Some(expires_at) = expires_at {
            if wake_at > expires_at {
                // Sleeping through the deadline would only delay the timeout.
                return Err(EngineError::PollTimeout(started.elapsed()));
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep_until(wake_at) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast() -> PollSettings {
        PollSettings::new(Duration::from_millis(1), None)
    }

    #[tokio::test]
    async fn test_ready_after_pending_checks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let value = poll_until(fast(), &CancellationToken::new(), || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                Ok(if n == 3 {
                    PollControl::Ready(n)
                } else {
                    PollControl::Pending
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_check_error_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = poll_until(fast(), &CancellationToken::new(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Network("reset".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(EngineError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let settings = PollSettings::new(Duration::from_millis(5), Some(Duration::from_millis(20)));

        let result: Result<(), _> = poll_until(settings, &CancellationToken::new(), || async {
            Ok(PollControl::Pending)
        })
        .await;

        assert!(matches!(result, Err(EngineError::PollTimeout(_))));
    }

    #[tokio::test]
    async fn test_huge_deadline_means_no_deadline() {
        let settings = PollSettings::new(Duration::from_millis(1), Some(Duration::MAX));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let value = poll_until(settings, &CancellationToken::new(), || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                Ok(if n == 2 {
                    PollControl::Ready(n)
                } else {
                    PollControl::Pending
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_huge_interval_waits_for_cancellation() {
        let settings = PollSettings::new(Duration::MAX, None);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), _> =
            poll_until(settings, &cancel, || async { Ok(PollControl::Pending) }).await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_huge_interval_still_times_out() {
        let settings = PollSettings::new(Duration::MAX, Some(Duration::from_millis(10)));

        let result: Result<(), _> = poll_until(settings, &CancellationToken::new(), || async {
            Ok(PollControl::Pending)
        })
        .await;

        assert!(matches!(result, Err(EngineError::PollTimeout(_))));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_sleep() {
        let settings = PollSettings::new(Duration::from_secs(3600), None);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), _> =
            poll_until(settings, &cancel, || async { Ok(PollControl::Pending) }).await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
