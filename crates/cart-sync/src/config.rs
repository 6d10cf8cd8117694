//! Synchronization core configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `KUSHIE_LOCAL_STORAGE_DIR` - Directory for durable local storage
//!   (default: in-memory storage)
//! - `KUSHIE_REMOTE_TIMEOUT_MS` - Timeout for remote reads and writes
//!   (default: 10000)
//! - `KUSHIE_MERGE_TOKEN_HISTORY` - Merge records kept per cart document
//!   (default: 20)
//! - `KUSHIE_LOG_JSON` - Emit JSON logs (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry event sample rate, 0.0-1.0 (default: 1.0)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MERGE_TOKEN_HISTORY: usize = 20;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Synchronization core configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory for durable local storage; in-memory when unset
    pub local_storage_dir: Option<PathBuf>,
    /// Remote store behavior
    pub remote: RemoteOptions,
    /// Emit JSON-formatted logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry event sample rate
    pub sentry_sample_rate: f32,
}

/// Settings shared by the remote cart and wishlist stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Upper bound for a single remote read or write
    pub timeout: Duration,
    /// Merge records kept in each cart document
    pub merge_history: usize,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
            merge_history: DEFAULT_MERGE_TOKEN_HISTORY,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_storage_dir: None,
            remote: RemoteOptions::default(),
            log_json: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let timeout_ms = parse_positive(
            "KUSHIE_REMOTE_TIMEOUT_MS",
            &get_env_or_default("KUSHIE_REMOTE_TIMEOUT_MS", &DEFAULT_REMOTE_TIMEOUT_MS.to_string()),
        )?;
        let merge_history = parse_positive(
            "KUSHIE_MERGE_TOKEN_HISTORY",
            &get_env_or_default(
                "KUSHIE_MERGE_TOKEN_HISTORY",
                &DEFAULT_MERGE_TOKEN_HISTORY.to_string(),
            ),
        )?;
        let log_json = parse_bool("KUSHIE_LOG_JSON", &get_env_or_default("KUSHIE_LOG_JSON", "false"))?;
        let sentry_sample_rate =
            parse_sample_rate(&get_env_or_default("SENTRY_SAMPLE_RATE", "1.0"))?;

        Ok(Self {
            local_storage_dir: get_optional_env("KUSHIE_LOCAL_STORAGE_DIR").map(PathBuf::from),
            remote: RemoteOptions {
                timeout: Duration::from_millis(timeout_ms),
                merge_history: usize::try_from(merge_history).unwrap_or(usize::MAX),
            },
            log_json,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if parsed == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected true or false, got '{other}'"),
        )),
    }
}

fn parse_sample_rate(value: &str) -> Result<f32, ConfigError> {
    let rate = value
        .trim()
        .parse::<f32>()
        .map_err(|e| ConfigError::InvalidEnvVar("SENTRY_SAMPLE_RATE".to_string(), e.to_string()))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::InvalidEnvVar(
            "SENTRY_SAMPLE_RATE".to_string(),
            format!("{rate} is outside 0.0-1.0"),
        ));
    }
    Ok(rate)
}
