//! Configuration management for QAStream
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{QaError, Result};
use crate::service::ServiceMode;
use crate::stream::FramePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for QAStream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway connection settings
    #[serde(default)]
    pub service: ServiceConfig,
    /// Stream decoding and pacing
    #[serde(default)]
    pub stream: StreamConfig,
    /// Connect retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Interactive chat defaults
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the API gateway
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a whole request, streaming included
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Upper bound for establishing the connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Stream decoding and pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Delay between delivered content updates, in milliseconds
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Handling of frames that lack a `data:` prefix
    #[serde(default)]
    pub frame_policy: FramePolicy,
}

fn default_pacing_ms() -> u64 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            frame_policy: FramePolicy::default(),
        }
    }
}

impl StreamConfig {
    /// Pacing delay as a duration
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Connect retry policy
///
/// Only the connect phase is retried; once the body has started streaming
/// a failure ends the turn with whatever was already delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each further retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Cap on the retry delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    4000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Retry policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use qastream::config::RetryConfig;
    ///
    /// let retry = RetryConfig::default();
    /// assert_eq!(retry.backoff(1), Duration::from_millis(250));
    /// assert_eq!(retry.backoff(2), Duration::from_millis(500));
    /// assert_eq!(retry.backoff(10), Duration::from_millis(4000));
    /// ```
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Interactive chat defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Service used when none is given on the command line
    #[serde(default = "default_mode")]
    pub default_mode: String,
}

fn default_mode() -> String {
    "tools".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| QaError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| QaError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("QASTREAM_BASE_URL") {
            self.service.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("QASTREAM_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(v) => self.service.timeout_seconds = v,
                Err(_) => tracing::warn!("Ignoring invalid QASTREAM_TIMEOUT_SECONDS: {}", timeout),
            }
        }

        if let Ok(pacing) = std::env::var("QASTREAM_PACING_MS") {
            match pacing.parse() {
                Ok(v) => self.stream.pacing_ms = v,
                Err(_) => tracing::warn!("Ignoring invalid QASTREAM_PACING_MS: {}", pacing),
            }
        }

        if let Ok(policy) = std::env::var("QASTREAM_FRAME_POLICY") {
            match FramePolicy::parse_str(&policy) {
                Ok(p) => self.stream.frame_policy = p,
                Err(e) => tracing::warn!("Ignoring QASTREAM_FRAME_POLICY: {}", e),
            }
        }

        if let Ok(retries) = std::env::var("QASTREAM_MAX_RETRIES") {
            match retries.parse() {
                Ok(v) => self.retry.max_retries = v,
                Err(_) => tracing::warn!("Ignoring invalid QASTREAM_MAX_RETRIES: {}", retries),
            }
        }

        if let Ok(mode) = std::env::var("QASTREAM_MODE") {
            self.chat.default_mode = mode;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            tracing::debug!("Using base URL override from CLI: {}", base_url);
            self.service.base_url = base_url.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Service used when the caller does not pick one
    pub fn default_mode(&self) -> Result<ServiceMode> {
        ServiceMode::parse_str(&self.chat.default_mode).map_err(|e| QaError::Config(e).into())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.service.base_url).map_err(|e| {
            QaError::Config(format!("Invalid base_url {}: {}", self.service.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(QaError::Config(format!(
                "base_url must use http or https, got {}",
                url.scheme()
            ))
            .into());
        }

        if self.service.timeout_seconds == 0 {
            return Err(
                QaError::Config("timeout_seconds must be greater than 0".to_string()).into(),
            );
        }

        if self.service.connect_timeout_seconds == 0 {
            return Err(QaError::Config(
                "connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.stream.pacing_ms > 1000 {
            return Err(QaError::Config(
                "stream.pacing_ms must be less than or equal to 1000".to_string(),
            )
            .into());
        }

        if self.retry.max_retries > 10 {
            return Err(QaError::Config(
                "retry.max_retries must be less than or equal to 10".to_string(),
            )
            .into());
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(QaError::Config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
            )
            .into());
        }

        self.default_mode()?;

        Ok(())
    }
}
