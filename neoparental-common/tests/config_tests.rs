//! Integration tests for configuration loading and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate NEOPARENTAL_CONFIG are marked with #[serial].

use neoparental_common::config::{explicit_config_path, ServiceConfig, CONFIG_ENV_VAR};
use neoparental_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).expect("Failed to write config file");
    path
}

#[test]
fn test_full_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[server]
host = "127.0.0.1"
port = 9100

[model]
path = "/srv/models/cry.json"
feature_layout = "with_mfcc_std"

[audio]
max_duration_secs = 10.0
max_upload_bytes = 5242880

[logging]
level = "debug"
"#,
    );

    let config = ServiceConfig::from_file(&path).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.model.path, PathBuf::from("/srv/models/cry.json"));
    assert_eq!(config.model.feature_layout, "with_mfcc_std");
    assert_eq!(config.audio.max_duration_secs, Some(10.0));
    assert_eq!(config.audio.max_upload_bytes, 5 * 1024 * 1024);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server]\nport = 8080\n");

    let config = ServiceConfig::from_file(&path).unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.model.feature_layout, "standard");
    assert_eq!(config.audio.max_upload_bytes, 10 * 1024 * 1024);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server\nport = ");

    let err = ServiceConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_zero_upload_cap_rejected() {
    let result = ServiceConfig::from_toml_str("[audio]\nmax_upload_bytes = 0\n");
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = explicit_config_path(Some(Path::new("/tmp/from-cli.toml")));
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = explicit_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);

    let result = ServiceConfig::load(Some(Path::new("/nonexistent/neoparental/config.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_load_from_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[logging]\nlevel = \"warn\"\n");
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = ServiceConfig::load(None).unwrap();
    assert_eq!(config.logging.level, "warn");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_unreadable_path_is_config_error() {
    // A directory cannot be read as a config file
    let dir = tempfile::tempdir().unwrap();
    match ServiceConfig::from_file(dir.path()) {
        Err(Error::Config(message)) => {
            assert!(message.contains("Failed to read config file"), "{}", message);
        }
        other => panic!("expected config error, got {:?}", other.map(|_| ())),
    }
}
