//! Reply delivery
//!
//! Glue between a chat transport and the orchestrator. A [`QuestionHandler`]
//! takes one inbound request through the access gate, keeps a typing
//! indicator alive while the assistant works, then delivers either every
//! segment of the answer or exactly one failure message. Never both.
//!
//! Transports plug in through [`ReplySink`]: [`DiscordReplySink`] posts over
//! the Discord REST API, [`ConsoleReplySink`] prints to stdout.

pub mod console;
pub mod discord;

pub use console::ConsoleReplySink;
pub use discord::DiscordReplySink;

use crate::chunker::{split_owned, truncate};
use crate::gate::AccessGate;
use crate::orchestrator::{Answer, OrchestrationError, Orchestrator};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::ChannelId;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Typing indicators expire after ~10 s on Discord; refresh a bit earlier.
pub const TYPING_REFRESH: Duration = Duration::from_secs(8);

/// Where a reply goes: a channel, optionally as a reply to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub channel: ChannelId,
    pub message_id: Option<String>,
}

impl ReplyTarget {
    pub fn channel(channel: ChannelId) -> Self {
        Self {
            channel,
            message_id: None,
        }
    }

    pub fn message(channel: ChannelId, message_id: impl Into<String>) -> Self {
        Self {
            channel,
            message_id: Some(message_id.into()),
        }
    }
}

/// Outbound side of a chat transport.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Posts one message. Segments of one answer are sent in order.
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<(), EngineError>;

    /// Shows a typing indicator in `channel`, if the transport has one.
    async fn typing(&self, _channel: &ChannelId) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Message the bot was given by the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub channel: ChannelId,
    pub content: String,
    /// Message this one replies to, if any.
    pub referenced: Option<ReferencedMessage>,
}

#[derive(Debug, Clone)]
pub struct ReferencedMessage {
    pub id: String,
    pub content: String,
}

/// One question to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub channel: ChannelId,
    pub question: String,
    pub target: ReplyTarget,
}

/// How an inbound message should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Not a command for this bot.
    Ignore,
    /// The command carried no question.
    Usage(ReplyTarget),
    Ask(Request),
}

/// Interprets a chat message.
///
/// A message starting with `prefix` is a command. When it replies to another
/// message, that message is the question and the answer replies to it;
/// otherwise the text after the prefix is the question and the answer
/// replies to the command itself.
pub fn parse_inbound(message: &InboundMessage, prefix: &str) -> Inbound {
    let Some(rest) = message.content.trim_start().strip_prefix(prefix) else {
        return Inbound::Ignore;
    };
    // `!avatar` is not `!ava`.
    if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
        return Inbound::Ignore;
    }

    let (question, target) = match &message.referenced {
        Some(referenced) => (
            referenced.content.trim().to_string(),
            ReplyTarget::message(message.channel.clone(), referenced.id.clone()),
        ),
        None => (
            rest.trim().to_string(),
            ReplyTarget::message(message.channel.clone(), message.id.clone()),
        ),
    };

    if question.is_empty() {
        return Inbound::Usage(target);
    }

    Inbound::Ask(Request {
        channel: message.channel.clone(),
        question,
        target,
    })
}

/// What happened to one request.
#[derive(Debug)]
pub enum Outcome {
    /// Channel not allowed, or not a command.
    Ignored,
    /// Usage hint sent for an empty command.
    Usage,
    /// Every segment was delivered.
    Answered { answer: Answer, segments: usize },
    /// The orchestration failed and its single failure message was sent.
    Failed { error: OrchestrationError },
    /// The transport rejected a reply; `delivered` segments made it.
    Undelivered { delivered: usize, error: EngineError },
}

pub struct QuestionHandler {
    orchestrator: Arc<Orchestrator>,
    gate: AccessGate,
    sink: Arc<dyn ReplySink>,
    message_limit: usize,
    prefix: String,
    typing_interval: Duration,
}

impl QuestionHandler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        gate: AccessGate,
        sink: Arc<dyn ReplySink>,
        message_limit: usize,
    ) -> Self {
        Self {
            orchestrator,
            gate,
            sink,
            message_limit,
            prefix: "!ava".to_string(),
            typing_interval: TYPING_REFRESH,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_typing_interval(mut self, interval: Duration) -> Self {
        self.typing_interval = interval;
        self
    }

    pub fn usage(&self) -> String {
        format!(
            "Usage: `{0} <question>`, or reply to a message with `{0}` to ask about it.",
            self.prefix
        )
    }

    /// Handles a raw chat message.
    pub async fn handle_message(&self, message: &InboundMessage) -> Outcome {
        match parse_inbound(message, &self.prefix) {
            Inbound::Ignore => Outcome::Ignored,
            Inbound::Usage(target) => {
                if !self.gate.is_allowed(&target.channel) {
                    return Outcome::Ignored;
                }
                match self.sink.send(&target, &self.usage()).await {
                    Ok(()) => Outcome::Usage,
                    Err(error) => Outcome::Undelivered {
                        delivered: 0,
                        error,
                    },
                }
            }
            Inbound::Ask(request) => self.handle(request).await,
        }
    }

    pub async fn handle(&self, request: Request) -> Outcome {
        self.handle_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Answers `request`, stopping the run early when `cancel` fires.
    pub async fn handle_with_cancel(&self, request: Request, cancel: &CancellationToken) -> Outcome {
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            channel = %request.channel
        );

        self.process(request, cancel).instrument(span).await
    }

    async fn process(&self, request: Request, cancel: &CancellationToken) -> Outcome {
        if !self.gate.is_allowed(&request.channel) {
            info!("Ignoring request from channel outside the allow-list");
            return Outcome::Ignored;
        }

        debug!("Question: {}", request.question);

        let typing = self.start_typing(&request.channel);
        let result = self
            .orchestrator
            .ask_with_cancel(&request.channel, &request.question, cancel)
            .await;
        typing.cancel();

        match result {
            Ok(answer) => self.deliver(&request.target, answer).await,
            Err(error) => {
                error!("Request failed: {}", error);
                // One message only, so it must fit the transport.
                let message = truncate(&error.user_message(), self.message_limit);
                if let Err(e) = self.sink.send(&request.target, &message).await {
                    error!("Failure reply not delivered: {}", e);
                    return Outcome::Undelivered {
                        delivered: 0,
                        error: e,
                    };
                }
                Outcome::Failed { error }
            }
        }
    }

    async fn deliver(&self, target: &ReplyTarget, answer: Answer) -> Outcome {
        let segments = split_owned(&answer.text, self.message_limit);
        let total = segments.len();

        for (index, segment) in segments.iter().enumerate() {
            if let Err(error) = self.sink.send(target, segment).await {
                error!("Segment {}/{} not delivered: {}", index + 1, total, error);
                return Outcome::Undelivered {
                    delivered: index,
                    error,
                };
            }
        }

        info!("Delivered answer in {} segment(s)", total);
        Outcome::Answered {
            answer,
            segments: total,
        }
    }

    /// Keeps the typing indicator alive until the returned token is
    /// cancelled.
    fn start_typing(&self, channel: &ChannelId) -> CancellationToken {
        let stop = CancellationToken::new();
        let guard = stop.clone();
        let sink = Arc::clone(&self.sink);
        let channel = channel.clone();
        let interval = self.typing_interval;

        tokio::spawn(
            async move {
                loop {
                    if let Err(e) = sink.typing(&channel).await {
                        warn!("Typing indicator failed: {}", e);
                    }
                    tokio::select! {
                        _ = guard.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
            .in_current_span(),
        );

        stop
    }
}
