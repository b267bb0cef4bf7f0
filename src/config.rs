//! Configuration management for the execution reconciler.
//!
//! Configuration is read from environment variables:
//! - `EXECUTION_API_URL` - Required. Base URL of the execution REST API (poll and cancel).
//! - `EXECUTION_EVENTS_URL` - Optional. Base URL of the event stream. Defaults to the API URL.
//! - `EXECUTION_API_TOKEN` - Optional. Bearer token sent on every upstream request.
//! - `HOST` - Optional. View server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. View server port. Defaults to `3100`.
//! - `POLL_INTERVAL_MS` - Optional. Snapshot poll cadence. Defaults to `2000`.
//! - `LOG_PACE_MS` - Optional. Terminal log pacer tick. Defaults to `45`.
//! - `LOG_MAX_LINES` - Optional. Retained log lines per execution. Defaults to `200`.
//! - `TOOL_GRACE_MS` - Optional. How long completed tools stay visible after the
//!   execution ends. Defaults to `4000`.
//! - `CANCEL_CONFIRM_TIMEOUT_SECS` - Optional. How long a cancelled session waits
//!   for a confirming event before releasing its subscription. Defaults to `30`.
//! - `EVENT_STREAM_ENABLED` - Optional. `false` runs poll-only. Defaults to `true`.
//! - `COMPLETION_WEBHOOK_URL` - Optional. Receives each finished execution as JSON.
//! - `COMPLETION_WEBHOOK_TOKEN` - Optional. Bearer token for the webhook. The
//!   API token is never sent there.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::session::ReconcilerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Execution REST API base URL
    pub api_url: String,

    /// Event stream base URL
    pub events_url: String,

    /// Bearer token for upstream requests
    pub api_token: Option<String>,

    /// View server host
    pub host: String,

    /// View server port
    pub port: u16,

    pub poll_interval_ms: u64,
    pub log_pace_ms: u64,
    pub log_max_lines: usize,
    pub tool_grace_ms: u64,
    pub cancel_confirm_timeout_secs: u64,

    /// Connect the push channel at all
    pub event_stream_enabled: bool,

    /// Where finished executions are POSTed, if anywhere
    pub completion_webhook_url: Option<String>,

    /// Bearer token for the completion webhook
    pub completion_webhook_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `EXECUTION_API_URL` is not set,
    /// or `ConfigError::InvalidValue` for unparseable numbers and URLs.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = get("EXECUTION_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("EXECUTION_API_URL".to_string()))?;
        let api_url = validate_url("EXECUTION_API_URL", &api_url)?;
        let events_url = match get("EXECUTION_EVENTS_URL") {
            Some(url) => validate_url("EXECUTION_EVENTS_URL", &url)?,
            None => api_url.clone(),
        };
        let completion_webhook_url = match get("COMPLETION_WEBHOOK_URL") {
            Some(url) => Some(validate_url("COMPLETION_WEBHOOK_URL", &url)?),
            None => None,
        };

        let defaults = Self::new(api_url.clone());
        Ok(Self {
            api_url,
            events_url,
            api_token: get("EXECUTION_API_TOKEN"),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            poll_interval_ms: parse_or(
                "POLL_INTERVAL_MS",
                get("POLL_INTERVAL_MS"),
                defaults.poll_interval_ms,
            )?,
            log_pace_ms: parse_or("LOG_PACE_MS", get("LOG_PACE_MS"), defaults.log_pace_ms)?,
            log_max_lines: parse_or("LOG_MAX_LINES", get("LOG_MAX_LINES"), defaults.log_max_lines)?,
            tool_grace_ms: parse_or("TOOL_GRACE_MS", get("TOOL_GRACE_MS"), defaults.tool_grace_ms)?,
            cancel_confirm_timeout_secs: parse_or(
                "CANCEL_CONFIRM_TIMEOUT_SECS",
                get("CANCEL_CONFIRM_TIMEOUT_SECS"),
                defaults.cancel_confirm_timeout_secs,
            )?,
            event_stream_enabled: match get("EVENT_STREAM_ENABLED") {
                Some(value) => parse_bool("EVENT_STREAM_ENABLED", &value)?,
                None => defaults.event_stream_enabled,
            },
            completion_webhook_url,
            completion_webhook_token: get("COMPLETION_WEBHOOK_TOKEN"),
        })
    }

    /// Create a config with defaults (useful for testing).
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        Self {
            events_url: api_url.clone(),
            api_url,
            api_token: None,
            host: "127.0.0.1".to_string(),
            port: 3100,
            poll_interval_ms: 2000,
            log_pace_ms: 45,
            log_max_lines: 200,
            tool_grace_ms: 4000,
            cancel_confirm_timeout_secs: 30,
            event_stream_enabled: true,
            completion_webhook_url: None,
            completion_webhook_token: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn log_pace(&self) -> Duration {
        Duration::from_millis(self.log_pace_ms)
    }

    pub fn tool_grace(&self) -> Duration {
        Duration::from_millis(self.tool_grace_ms)
    }

    pub fn cancel_confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_confirm_timeout_secs)
    }
}

impl From<&Config> for ReconcilerSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            log_pace: config.log_pace(),
            log_max_lines: config.log_max_lines,
            tool_grace: config.tool_grace(),
            cancel_confirm_timeout: config.cancel_confirm_timeout(),
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("expected a boolean, got {:?}", other),
        )),
    }
}

fn validate_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    url::Url::parse(trimmed)
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))?;
    Ok(trimmed.to_string())
}
