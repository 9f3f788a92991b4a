//! Integration tests for configuration management
//!
//! These tests load real files from disk and check that the parsed values
//! reach the components built from them.

use ava_engine::config::Config;
use ava_engine::gate::AccessGate;
use ava_engine::orchestrator::OrchestratorSettings;
use sdk::errors::EngineError;
use sdk::types::ChannelId;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let data_dir = dir.path().join("data");
    let contents = format!(
        "[core]\nlog_level = \"debug\"\ndata_dir = \"{}\"\n{}",
        data_dir.display().to_string().replace('\\', "/"),
        body
    );
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[assistant]
base_url = "http://localhost:8080/v1"
assistant_id = "asst_file"
organization_id = "org-file"
request_timeout_secs = 15

[orchestrator]
max_attempts = 5
poll_interval_ms = 250
retry_delay_ms = 100
poll_deadline_secs = 90

[chat]
allowed_channels = ["111", "222"]
message_limit = 1900
command_prefix = "!ask"
"#,
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert!(dir.path().join("data").is_dir());
    assert_eq!(config.assistant.base_url, "http://localhost:8080/v1");
    assert_eq!(config.assistant.request_timeout_secs, 15);
    assert_eq!(config.chat.message_limit, 1900);
    assert_eq!(config.chat.command_prefix, "!ask");
    assert_eq!(config.registry_path(), dir.path().join("data").join("threads.json"));

    let settings = OrchestratorSettings::from_config(&config.orchestrator);
    assert_eq!(settings.retry.max_attempts(), 5);
    assert_eq!(settings.retry.delay(), Duration::from_millis(100));
    assert_eq!(settings.poll.interval, Duration::from_millis(250));
    assert_eq!(settings.poll.deadline, Some(Duration::from_secs(90)));

    let gate = AccessGate::new(&config.chat.allowed_channels);
    assert!(gate.is_allowed(&ChannelId::new("111")));
    assert!(!gate.is_allowed(&ChannelId::new("333")));
}

#[test]
fn test_explicit_registry_path() {
    let dir = TempDir::new().unwrap();
    let registry = dir.path().join("elsewhere").join("map.json");
    let path = write_config(
        &dir,
        &format!(
            "[registry]\npath = \"{}\"\n",
            registry.display().to_string().replace('\\', "/")
        ),
    );

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.registry_path(), registry);
}

#[test]
fn test_empty_allow_list_opens_every_channel() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = Config::from_toml_str(&std::fs::read_to_string(&path).unwrap(), |_| None).unwrap();
    let gate = AccessGate::new(&config.chat.allowed_channels);

    assert!(gate.is_open());
    assert!(gate.is_allowed(&ChannelId::new("anything")));
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[chat\nmessage_limit = ").unwrap();

    match Config::load_from_path(&path) {
        Err(EngineError::Config(msg)) => assert!(msg.contains("Failed to parse config")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(EngineError::Config(_))));
}
