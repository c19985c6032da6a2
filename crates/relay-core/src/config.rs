//! Engine configuration: JSON file plus `RELAY_*` environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 60 * 60 * 1_000,
            max_retries: 5,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(c.base_delay_ms),
            multiplier: c.multiplier,
            max_delay: Duration::from_millis(c.max_delay_ms),
            max_retries: c.max_retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_count: usize,
    pub action_timeout_ms: u64,
    pub lease_ttl_ms: u64,
    pub poll_interval_ms: u64,
    pub reap_interval_ms: u64,
    pub retry: RetryConfig,
    /// Journal file for durable storage. `None` keeps events in memory only.
    pub journal_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            action_timeout_ms: 30_000,
            lease_ttl_ms: 5 * 60 * 1_000,
            poll_interval_ms: 500,
            reap_interval_ms: 30_000,
            retry: RetryConfig::default(),
            journal_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `RELAY_CONFIG` (if set), then applies individual `RELAY_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("RELAY_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                let raw = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };

        if let Some(v) = lookup("RELAY_WORKERS") {
            config.worker_count = parse("RELAY_WORKERS", &v)?;
        }
        if let Some(v) = lookup("RELAY_ACTION_TIMEOUT_MS") {
            config.action_timeout_ms = parse("RELAY_ACTION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("RELAY_LEASE_TTL_MS") {
            config.lease_ttl_ms = parse("RELAY_LEASE_TTL_MS", &v)?;
        }
        if let Some(v) = lookup("RELAY_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse("RELAY_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("RELAY_MAX_RETRIES") {
            config.retry.max_retries = parse("RELAY_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RELAY_JOURNAL") {
            config.journal_path = (!v.trim().is_empty()).then(|| PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be at least 1".into()));
        }
        for (name, value) in [
            ("action_timeout_ms", self.action_timeout_ms),
            ("lease_ttl_ms", self.lease_ttl_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("reap_interval_ms", self.reap_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.lease_ttl_ms <= self.action_timeout_ms {
            return Err(ConfigError::Invalid(
                "lease_ttl_ms must exceed action_timeout_ms".into(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid("retry.multiplier must be >= 1.0".into()));
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
