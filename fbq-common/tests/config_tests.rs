//! Integration tests for configuration loading and resolution
//!
//! Tests cover:
//! - Missing TOML files do not cause failure (defaults are used)
//! - Malformed TOML files are reported as configuration errors
//! - Priority order: CLI argument → environment variable → TOML → default
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate FBQ_* variables are marked with #[serial].

use fbq_common::config::{
    load_or_default, load_toml_config, locate_config_file, resolve_setting, ClientConfig,
    ConfigOverrides, TomlConfig, CONFIG_PATH_ENV, INGEST_URL_ENV, LOG_LEVEL_ENV, QUERY_URL_ENV,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn clear_env() {
    env::remove_var(CONFIG_PATH_ENV);
    env::remove_var(QUERY_URL_ENV);
    env::remove_var(INGEST_URL_ENV);
    env::remove_var(LOG_LEVEL_ENV);
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_full_toml_config_parses() {
    let file = write_config(
        r##"
query_url = "http://analytics.internal:9000/"
ingest_url = "http://ingest.internal:9010"
marker = "#"
stream_timeout_secs = 300
request_timeout_secs = 15

[logging]
level = "debug"
file = "/tmp/fbq.log"
"##,
    );

    let config = load_toml_config(file.path()).unwrap();
    assert_eq!(config.query_url, "http://analytics.internal:9000/");
    assert_eq!(config.marker, '#');
    assert_eq!(config.stream_timeout_secs, Some(300));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/fbq.log")));
}

#[test]
fn test_partial_toml_config_fills_defaults() {
    let file = write_config("query_url = \"http://example:1\"\n");
    let config = load_toml_config(file.path()).unwrap();
    assert_eq!(config.query_url, "http://example:1");
    assert_eq!(config.ingest_url, TomlConfig::default().ingest_url);
    assert_eq!(config.marker, '§');
    assert_eq!(config.stream_timeout_secs, None);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let file = write_config("query_url = [not valid");
    let err = load_toml_config(file.path()).unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
#[serial]
fn test_missing_explicit_file_degrades_to_defaults() {
    clear_env();
    let missing = PathBuf::from("/nonexistent/fbq/config.toml");
    let config = load_or_default(Some(&missing)).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_locate_prefers_cli_over_env() {
    clear_env();
    env::set_var(CONFIG_PATH_ENV, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    assert_eq!(locate_config_file(Some(&cli)), Some(cli.clone()));
    assert_eq!(
        locate_config_file(None),
        Some(PathBuf::from("/tmp/from-env.toml"))
    );

    clear_env();
}

#[test]
#[serial]
fn test_env_config_path_is_loaded() {
    clear_env();
    let file = write_config("marker = \"*\"\n");
    env::set_var(CONFIG_PATH_ENV, file.path());

    let config = load_or_default(None).unwrap();
    assert_eq!(config.marker, '*');

    clear_env();
}

#[test]
#[serial]
fn test_resolve_setting_priority() {
    clear_env();
    assert_eq!(resolve_setting(None, QUERY_URL_ENV, "http://toml"), "http://toml");

    env::set_var(QUERY_URL_ENV, "http://env");
    assert_eq!(resolve_setting(None, QUERY_URL_ENV, "http://toml"), "http://env");
    assert_eq!(
        resolve_setting(Some("http://cli"), QUERY_URL_ENV, "http://toml"),
        "http://cli"
    );
    // Blank CLI value falls through to the environment
    assert_eq!(resolve_setting(Some("  "), QUERY_URL_ENV, "http://toml"), "http://env");

    clear_env();
}

#[test]
#[serial]
fn test_client_config_resolution() {
    clear_env();
    env::set_var(INGEST_URL_ENV, "http://ingest-from-env:8010/");

    let toml_config = TomlConfig {
        stream_timeout_secs: Some(45),
        ..TomlConfig::default()
    };
    let overrides = ConfigOverrides {
        query_url: Some("http://cli-host:8004/".to_string()),
        ingest_url: None,
        log_level: Some("debug".to_string()),
    };

    let config = ClientConfig::resolve(toml_config, &overrides).unwrap();
    assert_eq!(config.query_url, "http://cli-host:8004");
    assert_eq!(config.ingest_url, "http://ingest-from-env:8010");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.stream_timeout, Some(Duration::from_secs(45)));

    clear_env();
}

#[test]
#[serial]
fn test_client_config_rejects_non_http_url() {
    clear_env();
    let overrides = ConfigOverrides {
        query_url: Some("localhost:8004".to_string()),
        ..ConfigOverrides::default()
    };
    assert!(ClientConfig::resolve(TomlConfig::default(), &overrides).is_err());
}
