//! CLI interface for Ava
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ava, a chat front for a hosted assistant
///
/// Routes questions from chat channels to an assistant, keeping one
/// conversation per channel, and posts the answer back in message-sized
/// segments.
#[derive(Parser, Debug)]
#[command(name = "ava")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask one question in a channel's conversation
    Ask {
        /// Channel whose conversation is used
        #[arg(long, value_name = "ID")]
        channel: String,

        /// Reply to this message; with --post and no question, its content
        /// is the question
        #[arg(long, value_name = "MSG")]
        reply_to: Option<String>,

        /// Post the answer to Discord instead of printing it
        #[arg(long)]
        post: bool,

        /// The question
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },

    /// Interactive session bound to one channel
    Chat {
        /// Channel whose conversation is used
        #[arg(long, value_name = "ID")]
        channel: String,
    },

    /// Inspect or edit the channel → conversation registry
    Threads {
        #[command(subcommand)]
        action: ThreadsAction,
    },

    /// Manage credentials in the OS keychain
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Validate configuration, credentials and the registry file
    Check,
}

/// Registry actions
#[derive(Subcommand, Debug)]
pub enum ThreadsAction {
    /// List every mapping
    List,

    /// Show the conversation bound to a channel
    Show {
        #[arg(long, value_name = "ID")]
        channel: String,
    },

    /// Drop a channel's mapping; its next question starts a new conversation
    Forget {
        #[arg(long, value_name = "ID")]
        channel: String,
    },

    /// Drop every mapping
    Reset,
}

/// Credential actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Store a credential (prompts without echo)
    Set {
        /// Credential key (openai_api_key, discord_token)
        key: String,
    },

    /// Remove a credential from the keychain
    Delete {
        /// Credential key (openai_api_key, discord_token)
        key: String,
    },

    /// Show where each credential is resolved from
    Status,
}
