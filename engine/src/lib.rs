//! Ava Engine Library
//!
//! This library provides the core functionality of Ava: routing chat
//! questions to a hosted assistant and delivering the answers back.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Telemetry and Observability
pub mod telemetry;

/// Remote conversation client
pub mod assistant;

/// Channel → conversation registry
pub mod registry;

/// Run orchestration: attempt loop, polling, retry
pub mod orchestrator;

/// Splitting answers into message-sized segments
pub mod chunker;

/// Channel allow-list
pub mod gate;

/// Reply delivery and inbound command handling
pub mod bot;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
