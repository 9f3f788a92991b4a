//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ava_engine::assistant::ConversationApi;
use ava_engine::bot::{ReplySink, ReplyTarget};
use ava_engine::orchestrator::{OrchestratorSettings, PollSettings, RetryPolicy};
use sdk::errors::EngineError;
use sdk::types::{ChannelId, ConversationId, RunAttempt, RunId, RunStatus};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Result<T> = std::result::Result<T, EngineError>;

/// Settings with millisecond delays so tests run fast.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        poll: PollSettings::new(Duration::from_millis(1), None),
    }
}

/// `ConversationApi` driven by scripted responses.
///
/// Each queue is consumed front to back; once empty, calls fall back to the
/// defaults: runs start fine, runs complete, the answer is "answer".
pub struct ScriptedApi {
    create_error: Mutex<Option<EngineError>>,
    append_error: Mutex<Option<EngineError>>,
    start_results: Mutex<VecDeque<Result<()>>>,
    statuses: Mutex<VecDeque<(RunStatus, Option<String>)>>,
    default_status: Mutex<RunStatus>,
    answers: Mutex<VecDeque<Result<Option<String>>>>,
    create_delay: Duration,
    start_delay: Duration,

    pub creates: AtomicUsize,
    pub appends: AtomicUsize,
    pub starts: AtomicUsize,
    pub polls: AtomicUsize,
    pub fetches: AtomicUsize,
    pub cancels: AtomicUsize,
    pub questions: Mutex<Vec<String>>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self {
            create_error: Mutex::new(None),
            append_error: Mutex::new(None),
            start_results: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(RunStatus::Completed),
            answers: Mutex::new(VecDeque::new()),
            create_delay: Duration::ZERO,
            start_delay: Duration::ZERO,
            creates: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            questions: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(self, error: EngineError) -> Self {
        *self.create_error.lock().unwrap() = Some(error);
        self
    }

    pub fn failing_append(self, error: EngineError) -> Self {
        *self.append_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_start_results(self, results: Vec<Result<()>>) -> Self {
        self.start_results.lock().unwrap().extend(results);
        self
    }

    pub fn with_statuses(self, statuses: Vec<RunStatus>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .extend(statuses.into_iter().map(|s| (s, None)));
        self
    }

    pub fn with_failed_run(self, reason: &str) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .push_back((RunStatus::Failed, Some(reason.to_string())));
        self
    }

    pub fn with_default_status(self, status: RunStatus) -> Self {
        *self.default_status.lock().unwrap() = status;
        self
    }

    pub fn with_answers(self, answers: Vec<Result<Option<String>>>) -> Self {
        self.answers.lock().unwrap().extend(answers);
        self
    }

    /// Makes every `create_conversation` call take `delay`.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Makes every `start_run` call take `delay`.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationApi for ScriptedApi {
    async fn create_conversation(&self, first_message: &str) -> Result<ConversationId> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.questions.lock().unwrap().push(first_message.to_string());
        tokio::time::sleep(self.create_delay).await;
        if let Some(error) = self.create_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(ConversationId::new(format!("thread_{}", n)))
    }

    async fn append_message(&self, _conversation: &ConversationId, text: &str) -> Result<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.questions.lock().unwrap().push(text.to_string());
        if let Some(error) = self.append_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(())
    }

    async fn start_run(&self, _conversation: &ConversationId) -> Result<RunId> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.start_delay).await;
        match self.start_results.lock().unwrap().pop_front() {
            Some(Err(error)) => Err(error),
            _ => Ok(RunId::new(format!("run_{}", n))),
        }
    }

    async fn get_run_status(
        &self,
        conversation: &ConversationId,
        run: &RunId,
    ) -> Result<RunAttempt> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let (status, error) = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| (*self.default_status.lock().unwrap(), None));

        let attempt = RunAttempt::new(conversation.clone(), run.clone(), status);
        Ok(match error {
            Some(error) => attempt.with_error(error),
            None => attempt,
        })
    }

    async fn latest_assistant_message(
        &self,
        _conversation: &ConversationId,
        _run: &RunId,
    ) -> Result<Option<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Some("answer".to_string())))
    }

    async fn cancel_run(&self, _conversation: &ConversationId, _run: &RunId) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// `ReplySink` that records everything it is asked to do.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(ReplyTarget, String)>>,
    pub typing: AtomicUsize,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every send after the first `n`.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_after.is_some_and(|n| sent.len() >= n) {
            return Err(EngineError::Remote {
                status: 429,
                body: r#"{"message": "You are being rate limited."}"#.to_string(),
            });
        }
        sent.push((target.clone(), text.to_string()));
        Ok(())
    }

    async fn typing(&self, _channel: &ChannelId) -> Result<()> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
