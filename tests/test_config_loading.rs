//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use mqtt_cli::config::{CliConfig, ConfigError, DEFAULT_CONFIG_FILE};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[reconnect]
initial_delay_ms = 500
max_delay_ms = 8000

[purge]
delay_ms = 25

[capability]
host = "127.0.0.1"
port = 11883
credentials_dir = ".secrets"

[tls]
cert_dir = "pki"

[session]
keep_alive_secs = 30
channel_capacity = 16
"#
    )
    .unwrap();

    let config = CliConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.reconnect.initial_delay_ms, 500);
    assert_eq!(config.reconnect.max_delay_ms, 8000);
    assert_eq!(config.purge_delay(), Duration::from_millis(25));
    assert_eq!(config.capability.host, "127.0.0.1");
    assert_eq!(config.capability.port, 11883);
    assert_eq!(config.capability.credentials_dir, PathBuf::from(".secrets"));
    assert_eq!(config.tls.cert_dir, PathBuf::from("pki"));
    assert_eq!(config.keep_alive(), Duration::from_secs(30));
    assert_eq!(config.session.channel_capacity, 16);
}

#[test]
fn test_empty_file_yields_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    let config = CliConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(config, CliConfig::default());
}

#[test]
fn test_invalid_toml_is_reported() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[purge\ndelay_ms = ").unwrap();

    assert!(matches!(
        CliConfig::load_from_file(temp_file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[reconnect]\ninitial_delay_ms = 0").unwrap();

    assert!(matches!(
        CliConfig::load_from_file(temp_file.path()),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = CliConfig::load(Some(&dir.path().join("missing.toml")), dir.path());
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_working_dir_file_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "[purge]\ndelay_ms = 10\n").unwrap();

    let config = CliConfig::load(None, dir.path()).unwrap();
    assert_eq!(config.purge.delay_ms, 10);
}

#[test]
fn test_no_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(CliConfig::load(None, dir.path()).unwrap(), CliConfig::default());
}
