//! End-to-end tests over HTTP
//!
//! Runs the real OpenAI threads client and Discord sink against wiremock
//! servers, with the handler, orchestrator and registry wired up as the
//! binary wires them.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use ava_engine::assistant::OpenAIThreadsClient;
use ava_engine::bot::discord::DiscordReplySink;
use ava_engine::bot::{Outcome, QuestionHandler, ReplySink, ReplyTarget, Request};
use ava_engine::config::AssistantConfig;
use ava_engine::gate::AccessGate;
use ava_engine::orchestrator::{Orchestrator, OrchestratorSettings, PollSettings, RetryPolicy};
use ava_engine::registry::ThreadRegistry;
use ava_engine::secrets::SecretString;
use sdk::errors::EngineError;
use sdk::types::ChannelId;

fn discord_sink(uri: &str) -> DiscordReplySink {
    DiscordReplySink::new(uri, SecretString::new("tok")).unwrap()
}

#[tokio::test]
async fn test_reply_references_original_message() {
    let discord = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/55/messages"))
        .and(header("Authorization", "Bot tok"))
        .and(body_partial_json(json!({
            "content": "hello",
            "message_reference": { "message_id": "900" },
            "allowed_mentions": { "parse": [] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "901" })))
        .expect(1)
        .mount(&discord)
        .await;

    discord_sink(&discord.uri())
        .send(&ReplyTarget::message(ChannelId::new("55"), "900"), "hello")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rate_limited_send_is_remote_error() {
    let discord = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/55/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "message": "You are being rate limited.",
            "retry_after": 0.5,
            "global": false
        })))
        .mount(&discord)
        .await;

    let error = discord_sink(&discord.uri())
        .send(&ReplyTarget::channel(ChannelId::new("55")), "hello")
        .await
        .unwrap_err();

    assert_eq!(error.status(), Some(429));
    assert_eq!(error.remote_message(), "You are being rate limited.");
}

#[tokio::test]
async fn test_fetch_referenced_message() {
    let discord = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/55/messages/900"))
        .and(header("Authorization", "Bot tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "900",
            "channel_id": "55",
            "content": "How do I reset my password?"
        })))
        .mount(&discord)
        .await;

    let message = discord_sink(&discord.uri())
        .fetch_message(&ChannelId::new("55"), "900")
        .await
        .unwrap();

    assert_eq!(message.id, "900");
    assert_eq!(message.content, "How do I reset my password?");
}

#[tokio::test]
async fn test_typing_indicator() {
    let discord = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/55/typing"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&discord)
        .await;

    discord_sink(&discord.uri())
        .typing(&ChannelId::new("55"))
        .await
        .unwrap();
}

async fn mount_assistant(openai: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_e2e" })))
        .expect(1)
        .mount(openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_e2e/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_2" })))
        .expect(1)
        .mount(openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_e2e/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": "queued"
        })))
        .mount(openai)
        .await;

    // First poll sees the run still going; later polls see it done.
    Mock::given(method("GET"))
        .and(path("/threads/thread_e2e/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": "in_progress"
        })))
        .up_to_n_times(1)
        .mount(openai)
        .await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_e2e/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": "completed"
        })))
        .mount(openai)
        .await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_e2e/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{
                "id": "msg_9",
                "role": "assistant",
                "content": [
                    { "type": "text", "text": { "value": "Line one【1:0†kb.md】\nLine two", "annotations": [] } }
                ]
            }]
        })))
        .mount(openai)
        .await;
}

#[tokio::test]
async fn test_question_answered_end_to_end() {
    let openai = MockServer::start().await;
    let discord = MockServer::start().await;
    mount_assistant(&openai).await;

    Mock::given(method("POST"))
        .and(path("/channels/77/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "reply" })))
        .mount(&discord)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/77/typing"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&discord)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let registry_path = temp_dir.path().join("threads.json");
    let config = AssistantConfig {
        base_url: openai.uri(),
        assistant_id: "asst_e2e".to_string(),
        ..AssistantConfig::default()
    };
    let api = Arc::new(OpenAIThreadsClient::new(&config, SecretString::new("sk-e2e")).unwrap());
    let registry = Arc::new(ThreadRegistry::open(&registry_path).await);
    let settings = OrchestratorSettings {
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        poll: PollSettings::new(Duration::from_millis(5), Some(Duration::from_secs(5))),
    };
    let orchestrator = Arc::new(Orchestrator::new(api, registry, settings));
    let sink = Arc::new(discord_sink(&discord.uri()));
    let handler = QuestionHandler::new(orchestrator, AccessGate::new(["77"]), sink, 9);

    let ask = |question: &str| Request {
        channel: ChannelId::new("77"),
        question: question.to_string(),
        target: ReplyTarget::message(ChannelId::new("77"), "q1"),
    };

    let outcome = handler.handle(ask("What's new?")).await;
    match outcome {
        Outcome::Answered { answer, segments } => {
            assert_eq!(answer.text, "Line one\nLine two");
            assert_eq!(segments, 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&registry_path).unwrap()).unwrap();
    assert_eq!(stored, json!({ "77": "thread_e2e" }));

    // Same channel again: the conversation is reused, not recreated.
    let outcome = handler.handle(ask("And tomorrow?")).await;
    assert!(matches!(outcome, Outcome::Answered { .. }));

    let posted: Vec<String> = discord
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/channels/77/messages")
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["content"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(posted, vec!["Line one", "Line two", "Line one", "Line two"]);
}

#[tokio::test]
async fn test_assistant_rejection_reported_once() {
    let openai = MockServer::start().await;
    let discord = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided: sk-bad***", "type": "invalid_request_error" }
        })))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/77/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "reply" })))
        .expect(1)
        .mount(&discord)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/77/typing"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&discord)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = AssistantConfig {
        base_url: openai.uri(),
        assistant_id: "asst_e2e".to_string(),
        ..AssistantConfig::default()
    };
    let api = Arc::new(OpenAIThreadsClient::new(&config, SecretString::new("sk-bad")).unwrap());
    let registry = Arc::new(ThreadRegistry::open(temp_dir.path().join("threads.json")).await);
    let orchestrator = Arc::new(Orchestrator::new(
        api,
        registry,
        OrchestratorSettings {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            poll: PollSettings::new(Duration::from_millis(5), None),
        },
    ));
    let handler = QuestionHandler::new(
        orchestrator,
        AccessGate::allow_all(),
        Arc::new(discord_sink(&discord.uri())),
        2000,
    );

    let outcome = handler
        .handle(Request {
            channel: ChannelId::new("77"),
            question: "Hi".to_string(),
            target: ReplyTarget::channel(ChannelId::new("77")),
        })
        .await;

    match outcome {
        Outcome::Failed { error } => {
            assert!(matches!(
                error.engine_error(),
                EngineError::Remote { status: 401, .. }
            ));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
