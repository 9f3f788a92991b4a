// Ava
// Main entry point for the ava binary

use clap::Parser;
use ava_engine::cli::{Cli, Command, SecretAction, ThreadsAction};
use ava_engine::config::Config;
use ava_engine::handlers::{
    handle_ask, handle_chat, handle_check, handle_secret_delete, handle_secret_set,
    handle_secret_status, handle_threads_forget, handle_threads_list, handle_threads_reset,
    handle_threads_show, OutputFormat,
};
use ava_engine::telemetry::{self, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Secret management works without a valid configuration
    let command = match cli.command {
        Command::Secret { action } => {
            telemetry::init(cli.log.as_deref().unwrap_or("warn"), LogFormat::from_env());
            return match action {
                SecretAction::Set { key } => handle_secret_set(key).await,
                SecretAction::Delete { key } => handle_secret_delete(key).await,
                SecretAction::Status => handle_secret_status(format).await,
            };
        }
        other => other,
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    telemetry::init(
        cli.log.as_deref().unwrap_or(&config.core.log_level),
        LogFormat::from_env(),
    );

    tracing::debug!(
        "Ava v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    // Handle commands
    match command {
        Command::Ask {
            channel,
            reply_to,
            post,
            question,
        } => handle_ask(channel, reply_to, post, question.join(" "), &config, format).await,

        Command::Chat { channel } => handle_chat(channel, &config, format).await,

        Command::Threads { action } => match action {
            ThreadsAction::List => handle_threads_list(&config, format).await,
            ThreadsAction::Show { channel } => handle_threads_show(channel, &config, format).await,
            ThreadsAction::Forget { channel } => {
                handle_threads_forget(channel, &config, format).await
            }
            ThreadsAction::Reset => handle_threads_reset(&config, format).await,
        },

        Command::Check => handle_check(&config, format).await,

        // Dispatched above, before the configuration was loaded.
        Command::Secret { .. } => Ok(()),
    }
}
