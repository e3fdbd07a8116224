//! Configuration loading and resolution
//!
//! Two layers:
//! 1. **TOML bootstrap** (`TomlConfig`): endpoints, marker glyph, timeouts, logging
//! 2. **Resolved runtime view** (`ClientConfig`): validated values with overrides applied
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--query-url`, `--ingest-url`, `--log-level`)
//! 2. Environment variables (`FBQ_QUERY_URL`, `FBQ_INGEST_URL`, `FBQ_LOG_LEVEL`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing config file is not an error: a warning is logged and defaults are used.
//! A config file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default base URL of the query service (streaming + feedback endpoints)
pub const DEFAULT_QUERY_URL: &str = "http://localhost:8004";

/// Default base URL of the CSV ingestion service
pub const DEFAULT_INGEST_URL: &str = "http://localhost:8010";

/// Default marker glyph for user-facing progress lines
pub const DEFAULT_MARKER: char = '§';

/// Default timeout for one-shot requests (feedback fetch, upload, non-streaming ask)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "FBQ_CONFIG";
/// Environment override for the query service URL
pub const QUERY_URL_ENV: &str = "FBQ_QUERY_URL";
/// Environment override for the ingestion service URL
pub const INGEST_URL_ENV: &str = "FBQ_INGEST_URL";
/// Environment override for the log level
pub const LOG_LEVEL_ENV: &str = "FBQ_LOG_LEVEL";

/// Bootstrap configuration loaded from TOML file
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the query service
    #[serde(default = "default_query_url")]
    pub query_url: String,

    /// Base URL of the CSV ingestion service
    #[serde(default = "default_ingest_url")]
    pub ingest_url: String,

    /// Prefix glyph marking log lines meant for the user
    #[serde(default = "default_marker")]
    pub marker: char,

    /// Stall timeout for the query stream, in seconds
    ///
    /// Unset means a stalled stream stays loading until the transport fails.
    #[serde(default)]
    pub stream_timeout_secs: Option<u64>,

    /// Timeout for one-shot requests, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_query_url() -> String {
    DEFAULT_QUERY_URL.to_string()
}

fn default_ingest_url() -> String {
    DEFAULT_INGEST_URL.to_string()
}

fn default_marker() -> char {
    DEFAULT_MARKER
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            query_url: default_query_url(),
            ingest_url: default_ingest_url(),
            marker: default_marker(),
            stream_timeout_secs: None,
            request_timeout_secs: default_request_timeout_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Platform config file location (`<config_dir>/fbq/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fbq").join("config.toml"))
}

/// Locate the config file to load
///
/// Priority: explicit path → `FBQ_CONFIG` → platform default (only if it exists).
/// Returns `None` when no candidate applies.
pub fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform default, only when present
    default_config_path().filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the TOML config, degrading to defaults when no file is available
pub fn load_or_default(cli_path: Option<&Path>) -> Result<TomlConfig> {
    match locate_config_file(cli_path) {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            debug!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve one string setting: CLI → ENV → TOML value
pub fn resolve_setting(cli_arg: Option<&str>, env_var_name: &str, toml_value: &str) -> String {
    // Priority 1: Command-line argument
    if let Some(value) = cli_arg.filter(|v| !v.trim().is_empty()) {
        return value.to_string();
    }

    // Priority 2: Environment variable
    if let Ok(value) = std::env::var(env_var_name) {
        if !value.trim().is_empty() {
            return value;
        }
    }

    // Priority 3/4: TOML (already carries built-in defaults)
    toml_value.to_string()
}

/// Command-line overrides applied on top of the TOML config
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub query_url: Option<String>,
    pub ingest_url: Option<String>,
    pub log_level: Option<String>,
}

/// Resolved, validated client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Query service base URL, without trailing slash
    pub query_url: String,
    /// Ingestion service base URL, without trailing slash
    pub ingest_url: String,
    /// Marker glyph for transcript filtering
    pub marker: char,
    /// Optional stall timeout for the query stream
    pub stream_timeout: Option<Duration>,
    /// Timeout for one-shot requests
    pub request_timeout: Duration,
    /// Log level directive
    pub log_level: String,
    /// Optional log file
    pub log_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Apply overrides to a TOML config and validate the result
    pub fn resolve(toml_config: TomlConfig, overrides: &ConfigOverrides) -> Result<Self> {
        let query_url = resolve_setting(
            overrides.query_url.as_deref(),
            QUERY_URL_ENV,
            &toml_config.query_url,
        );
        let ingest_url = resolve_setting(
            overrides.ingest_url.as_deref(),
            INGEST_URL_ENV,
            &toml_config.ingest_url,
        );
        let log_level = resolve_setting(
            overrides.log_level.as_deref(),
            LOG_LEVEL_ENV,
            &toml_config.logging.level,
        );

        if toml_config.marker.is_whitespace() {
            return Err(Error::Config(
                "marker must be a visible character".to_string(),
            ));
        }
        if toml_config.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        let stream_timeout = match toml_config.stream_timeout_secs {
            Some(0) => {
                warn!("stream_timeout_secs = 0 disables the stream timeout");
                None
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Self {
            query_url: normalize_base_url(&query_url, "query_url")?,
            ingest_url: normalize_base_url(&ingest_url, "ingest_url")?,
            marker: toml_config.marker,
            stream_timeout,
            request_timeout: Duration::from_secs(toml_config.request_timeout_secs),
            log_level,
            log_file: toml_config.logging.file,
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            query_url: DEFAULT_QUERY_URL.to_string(),
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            marker: DEFAULT_MARKER,
            stream_timeout: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Check the scheme and strip trailing slashes from a base URL
fn normalize_base_url(raw: &str, field: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::Config(format!(
            "{} must be an http(s) URL, got '{}'",
            field, raw
        )));
    }
    Ok(trimmed.to_string())
}
