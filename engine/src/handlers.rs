//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - ask: Answer one question in a channel's conversation
//! - chat: Interactive session bound to one channel
//! - threads: Inspect and edit the channel → conversation registry
//! - secret: Manage keychain credentials
//! - check: Validate configuration, credentials and the registry file

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::assistant::OpenAIThreadsClient;
use crate::bot::{
    ConsoleReplySink, DiscordReplySink, Outcome, QuestionHandler, ReplySink, ReplyTarget, Request,
};
use crate::config::Config;
use crate::gate::AccessGate;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::registry::{Snapshot, ThreadRegistry};
use crate::secrets::{SecretManager, SecretSource, DISCORD_TOKEN, OPENAI_API_KEY};
use sdk::types::ChannelId;

/// Keychain service name
pub const SERVICE_NAME: &str = "ava";

/// Credentials the CLI knows how to manage
const KNOWN_SECRETS: &[&str] = &[OPENAI_API_KEY, DISCORD_TOKEN];

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Wires the assistant client and the registry into an orchestrator.
pub async fn build_orchestrator(config: &Config) -> Result<Arc<Orchestrator>> {
    config.assistant_id()?;

    let secrets = SecretManager::new(SERVICE_NAME);
    let api_key = secrets.get_secret(OPENAI_API_KEY)?;
    let client = OpenAIThreadsClient::new(&config.assistant, api_key)?;

    let registry = Arc::new(ThreadRegistry::open(config.registry_path()).await);

    Ok(Arc::new(Orchestrator::new(
        Arc::new(client),
        registry,
        OrchestratorSettings::from_config(&config.orchestrator),
    )))
}

fn build_handler(
    config: &Config,
    orchestrator: Arc<Orchestrator>,
    sink: Arc<dyn ReplySink>,
) -> QuestionHandler {
    QuestionHandler::new(
        orchestrator,
        AccessGate::new(&config.chat.allowed_channels),
        sink,
        config.chat.message_limit,
    )
    .with_prefix(config.chat.command_prefix.clone())
}

fn discord_sink(config: &Config) -> Result<DiscordReplySink> {
    let token = SecretManager::new(SERVICE_NAME).get_secret(DISCORD_TOKEN)?;
    Ok(DiscordReplySink::new(&config.chat.discord_base_url, token)?)
}

/// Cancels the returned token on Ctrl-C. The watcher exits once the token
/// is cancelled by anyone.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = trigger.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    tracing::info!("Interrupted, cancelling run");
                    trigger.cancel();
                }
            }
        }
    });
    cancel
}

/// Answer one question
///
/// Prints the answer segments, or posts them to Discord with `post`. When
/// posting a reply with no question, the replied-to message is the question.
pub async fn handle_ask(
    channel: String,
    reply_to: Option<String>,
    post: bool,
    question: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let channel = ChannelId::new(channel);
    let mut question = question.trim().to_string();

    let sink: Arc<dyn ReplySink> = if post {
        let discord = discord_sink(config)?;
        if question.is_empty() {
            if let Some(message_id) = &reply_to {
                let referenced = discord
                    .fetch_message(&channel, message_id)
                    .await
                    .context("Failed to fetch the replied-to message")?;
                question = referenced.content.trim().to_string();
            }
        }
        Arc::new(discord)
    } else {
        Arc::new(ConsoleReplySink::stdout(format))
    };

    if question.is_empty() {
        bail!("No question given");
    }

    let target = match reply_to {
        Some(message_id) => ReplyTarget::message(channel.clone(), message_id),
        None => ReplyTarget::channel(channel.clone()),
    };

    let orchestrator = build_orchestrator(config).await?;
    let handler = build_handler(config, orchestrator, sink);
    let request = Request {
        channel: channel.clone(),
        question,
        target,
    };

    let outcome = handler
        .handle_with_cancel(request, &cancel_on_interrupt())
        .await;
    report_outcome(&channel, outcome, post, format)
}

fn report_outcome(
    channel: &ChannelId,
    outcome: Outcome,
    posted: bool,
    format: OutputFormat,
) -> Result<()> {
    match outcome {
        Outcome::Answered { answer, segments } => {
            if posted {
                match format {
                    OutputFormat::Text => println!(
                        "Posted {} segment(s) to channel {} (conversation {})",
                        segments, channel, answer.conversation_id
                    ),
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "channel": channel,
                            "conversation_id": answer.conversation_id,
                            "run_id": answer.run_id,
                            "attempts": answer.attempts,
                            "segments": segments,
                        }))?
                    ),
                }
            }
            Ok(())
        }
        Outcome::Failed { error } => Err(anyhow::Error::new(error)),
        Outcome::Undelivered { delivered, error } => Err(anyhow::Error::new(error)
            .context(format!("Reply delivery stopped after {} segment(s)", delivered))),
        Outcome::Ignored => bail!("Channel {} is not in the allow-list", channel),
        Outcome::Usage => Ok(()),
    }
}

/// Interactive session
///
/// Reads questions line by line from stdin and answers each in the
/// channel's conversation. Ctrl-C cancels the question in flight; an empty
/// read (EOF), `exit` or `quit` ends the session.
pub async fn handle_chat(channel: String, config: &Config, format: OutputFormat) -> Result<()> {
    let channel = ChannelId::new(channel);
    let orchestrator = build_orchestrator(config).await?;
    let handler = build_handler(
        config,
        orchestrator,
        Arc::new(ConsoleReplySink::stdout(format)),
    );

    if !AccessGate::new(&config.chat.allowed_channels).is_allowed(&channel) {
        bail!("Channel {} is not in the allow-list", channel);
    }

    eprintln!("Chatting in channel {}. Type `exit` to leave.", channel);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let request = Request {
            channel: channel.clone(),
            question: question.to_string(),
            target: ReplyTarget::channel(channel.clone()),
        };

        // One token per question so a cancelled run does not end the session.
        let cancel = cancel_on_interrupt();
        let outcome = handler.handle_with_cancel(request, &cancel).await;
        // Stops the watcher from cancelling anything once the answer is in.
        cancel.cancel();

        if let Err(e) = report_outcome(&channel, outcome, false, format) {
            eprintln!("{:#}", e);
        }
    }

    Ok(())
}

/// List every channel → conversation mapping
pub async fn handle_threads_list(config: &Config, format: OutputFormat) -> Result<()> {
    let registry = ThreadRegistry::open(config.registry_path()).await;
    let snapshot = registry.snapshot().await;

    match format {
        OutputFormat::Text => {
            if snapshot.is_empty() {
                println!("No conversations yet.");
            } else {
                println!("{:<24} CONVERSATION", "CHANNEL");
                for (channel, conversation) in &snapshot {
                    println!("{:<24} {}", channel, conversation);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

/// Show the conversation bound to one channel
pub async fn handle_threads_show(
    channel: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let registry = ThreadRegistry::open(config.registry_path()).await;
    let channel = ChannelId::new(channel);
    let conversation = registry.resolve(&channel).await;

    match format {
        OutputFormat::Text => match &conversation {
            Some(conversation) => println!("{}", conversation),
            None => println!("Channel {} has no conversation yet.", channel),
        },
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "channel": channel,
                "conversation_id": conversation,
            }))?
        ),
    }

    Ok(())
}

/// Drop one channel's mapping
pub async fn handle_threads_forget(
    channel: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let registry = ThreadRegistry::open(config.registry_path()).await;
    let channel = ChannelId::new(channel);
    let removed = registry.forget(&channel).await?;

    match format {
        OutputFormat::Text => match &removed {
            Some(conversation) => println!(
                "Channel {} unbound from {}; its next question starts a new conversation.",
                channel, conversation
            ),
            None => println!("Channel {} had no conversation.", channel),
        },
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "channel": channel,
                "removed": removed,
            }))?
        ),
    }

    Ok(())
}

/// Drop every mapping
pub async fn handle_threads_reset(config: &Config, format: OutputFormat) -> Result<()> {
    let registry = ThreadRegistry::open(config.registry_path()).await;
    let removed = registry.reset().await?;

    match format {
        OutputFormat::Text => println!("Removed {} mapping(s).", removed),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "removed": removed }))?
        ),
    }

    Ok(())
}

fn known_secret(key: &str) -> Result<&str> {
    match KNOWN_SECRETS.iter().find(|k| **k == key) {
        Some(key) => Ok(key),
        None => bail!(
            "Unknown credential '{}'. Known: {}",
            key,
            KNOWN_SECRETS.join(", ")
        ),
    }
}

/// Store a credential in the keychain, prompting without echo
pub async fn handle_secret_set(key: String) -> Result<()> {
    let key = known_secret(&key)?;
    let value = rpassword::prompt_password_stdout(&format!("{}: ", key))
        .context("Failed to read credential")?;

    SecretManager::new(SERVICE_NAME).set_secret(key, value.trim())?;
    println!("Stored '{}' in the keychain.", key);
    Ok(())
}

/// Remove a credential from the keychain
pub async fn handle_secret_delete(key: String) -> Result<()> {
    let key = known_secret(&key)?;
    SecretManager::new(SERVICE_NAME).delete_secret(key)?;
    println!("Deleted '{}' from the keychain.", key);
    Ok(())
}

fn describe_source(source: Option<SecretSource>) -> &'static str {
    match source {
        Some(SecretSource::Environment) => "environment",
        Some(SecretSource::Keychain) => "keychain",
        None => "missing",
    }
}

/// Show where each credential resolves from
pub async fn handle_secret_status(format: OutputFormat) -> Result<()> {
    let secrets = SecretManager::new(SERVICE_NAME);
    let rows: Vec<(&str, &str)> = KNOWN_SECRETS
        .iter()
        .map(|key| (*key, describe_source(secrets.source_of(key))))
        .collect();

    match format {
        OutputFormat::Text => {
            for (key, source) in &rows {
                println!("  {:<20} {}", key, source);
            }
        }
        OutputFormat::Json => {
            let output: serde_json::Map<String, serde_json::Value> = rows
                .iter()
                .map(|(key, source)| (key.to_string(), json!(source)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Validate configuration, credentials and the registry file
///
/// The configuration itself was validated when it was loaded.
pub async fn handle_check(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    checks.push(("Configuration", "Valid".to_string()));

    match config.assistant_id() {
        Ok(id) => checks.push(("Assistant", id.to_string())),
        Err(e) => {
            checks.push(("Assistant", "Not configured".to_string()));
            issues.push(e.to_string());
        }
    }

    let secrets = SecretManager::new(SERVICE_NAME);
    let api_key = secrets.source_of(OPENAI_API_KEY);
    checks.push(("OpenAI API key", describe_source(api_key).to_string()));
    if api_key.is_none() {
        issues.push(format!(
            "No OpenAI API key. Set $OPENAI_API_KEY or run `ava secret set {}`",
            OPENAI_API_KEY
        ));
    }

    // Only needed for `ask --post`.
    checks.push((
        "Discord token",
        describe_source(secrets.source_of(DISCORD_TOKEN)).to_string(),
    ));

    let gate = AccessGate::new(&config.chat.allowed_channels);
    checks.push((
        "Allowed channels",
        if gate.is_open() {
            "all".to_string()
        } else {
            gate.len().to_string()
        },
    ));

    let registry_path = config.registry_path();
    match tokio::fs::read_to_string(&registry_path).await {
        Ok(contents) if contents.trim().is_empty() => {
            checks.push(("Registry", "Empty".to_string()));
        }
        Ok(contents) => match serde_json::from_str::<Snapshot>(&contents) {
            Ok(snapshot) => checks.push(("Registry", format!("{} mapping(s)", snapshot.len()))),
            Err(e) => {
                checks.push(("Registry", "Corrupt".to_string()));
                issues.push(format!(
                    "Registry file {} is corrupt ({}); it will be replaced on the next bind",
                    registry_path.display(),
                    e
                ));
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            checks.push(("Registry", "Not created yet".to_string()));
        }
        Err(e) => {
            checks.push(("Registry", "Unreadable".to_string()));
            issues.push(format!(
                "Cannot read registry file {}: {}",
                registry_path.display(),
                e
            ));
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Ava Configuration Check");
            println!("=======================");
            println!();

            for (check, status) in &checks {
                println!("  {:<20} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        bail!("{} issue(s) found", issues.len())
    }
}
