//! Configuration for the resilience core.
//!
//! Every component takes its own small config struct; [`ResilienceConfig`]
//! bundles them and knows how to read overrides from the environment.
//!
//! # Example
//!
//! ```ignore
//! use nutrilink::config::ResilienceConfig;
//!
//! let config = ResilienceConfig::from_env()?
//!     .with_channel_url("wss://api.nutrilink.app/realtime");
//! config.validate()?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("Could not determine a data directory; set NUTRILINK_STORAGE_DIR")]
    NoDataDirectory,
}

/// Retry and refresh policy for the recovery engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Maximum re-invocations for a `Retry` error (default: 3)
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * (n + 1)` (default: 1s)
    pub retry_delay: Duration,
    /// Upper bound for a single backoff wait (default: 10s)
    pub max_retry_delay: Duration,
    /// Timeout for one token refresh (default: 10s)
    pub refresh_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_secs(10),
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

impl RecoveryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Wait before the re-invocation that follows `retry_count` failures.
    ///
    /// Linear in the attempt number and capped by `max_retry_delay`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        self.retry_delay
            .saturating_mul(retry_count.saturating_add(1))
            .min(self.max_retry_delay)
    }
}

/// Lifecycle policy for the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Channel URL
    pub url: String,
    /// Fixed wait between automatic reconnect attempts (default: 5s)
    pub reconnect_interval: Duration,
    /// Scheduled reconnects before giving up (default: 10)
    pub max_reconnect_attempts: u32,
    /// Bound for opening the channel (default: 10s)
    pub connect_timeout: Duration,
    /// Outbound messages kept while disconnected (default: 100)
    pub max_queued_messages: usize,
    /// Rolling history kept per inbound category (default: 50)
    pub history_limit: usize,
    /// Liveness ping period while connected (default: 30s)
    pub ping_interval: Duration,
    /// Wait for the pong before the channel is declared dead (default: 10s)
    pub pong_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/realtime".to_string(),
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            connect_timeout: Duration::from_secs(10),
            max_queued_messages: 100,
            history_limit: 50,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_queued_messages(mut self, bound: usize) -> Self {
        self.max_queued_messages = bound;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }
}

/// Storage layout for the offline action queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Key prefix in the key-value store (default: "nutrilink.offline")
    pub namespace: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            namespace: "nutrilink.offline".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn pending_key(&self) -> String {
        format!("{}.pending", self.namespace)
    }

    pub fn dead_letter_key(&self) -> String {
        format!("{}.dead_letter", self.namespace)
    }
}

/// Complete configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub connection: ConnectionConfig,
    pub recovery: RecoveryConfig,
    pub queue: QueueConfig,
    /// Base URL of the REST API used for replay and token refresh
    pub api_base_url: String,
    /// Directory for the file-backed key-value store
    pub storage_dir: Option<PathBuf>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            recovery: RecoveryConfig::default(),
            queue: QueueConfig::default(),
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            storage_dir: None,
        }
    }
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_url(mut self, url: impl Into<String>) -> Self {
        self.connection.url = url.into();
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Build a config from `NUTRILINK_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("NUTRILINK_CHANNEL_URL") {
            config.connection.url = url;
        }
        if let Some(url) = lookup("NUTRILINK_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup("NUTRILINK_STORAGE_DIR") {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(namespace) = lookup("NUTRILINK_NAMESPACE") {
            config.queue.namespace = namespace;
        }

        if let Some(ms) = parse_var(&lookup, "NUTRILINK_RECONNECT_INTERVAL_MS")? {
            config.connection.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "NUTRILINK_MAX_RECONNECT_ATTEMPTS")? {
            config.connection.max_reconnect_attempts = n;
        }
        if let Some(n) = parse_var(&lookup, "NUTRILINK_QUEUE_BOUND")? {
            config.connection.max_queued_messages = n;
        }
        if let Some(ms) = parse_var(&lookup, "NUTRILINK_PING_INTERVAL_MS")? {
            config.connection.ping_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "NUTRILINK_PONG_TIMEOUT_MS")? {
            config.connection.pong_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "NUTRILINK_MAX_RETRIES")? {
            config.recovery.max_retries = n;
        }
        if let Some(ms) = parse_var(&lookup, "NUTRILINK_RETRY_DELAY_MS")? {
            config.recovery.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "NUTRILINK_MAX_RETRY_DELAY_MS")? {
            config.recovery.max_retry_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Reject settings that would spin or never make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.reconnect_interval.is_zero() {
            return Err(ConfigError::Zero("reconnect interval"));
        }
        if self.connection.ping_interval.is_zero() {
            return Err(ConfigError::Zero("ping interval"));
        }
        if self.connection.pong_timeout.is_zero() {
            return Err(ConfigError::Zero("pong timeout"));
        }
        if self.connection.max_queued_messages == 0 {
            return Err(ConfigError::Zero("queue bound"));
        }
        if self.connection.history_limit == 0 {
            return Err(ConfigError::Zero("history limit"));
        }
        Ok(())
    }

    /// Directory for persisted state, defaulting to the platform data dir.
    pub fn resolved_storage_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("nutrilink"))
                .ok_or(ConfigError::NoDataDirectory),
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}
