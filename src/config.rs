use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// Default bound on the warm-up wait performed by `start()`.
pub const DEFAULT_WARMUP_TIMEOUT_MS: u64 = 30_000;

/// Default bound on the shutdown-acknowledgment wait performed by `stop()`.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

/// Default per-fetch timeout used by the replication poller.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10;

/// Settings for one log-replicated repository.
///
/// The topic must be unique per logical repository: every instance sharing
/// it replays the same mutation history and converges on the same
/// membership set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub topic: String,
    pub bootstrap_servers: String,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_warmup_timeout_ms")]
    pub warmup_timeout_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Opaque pass-through options for the concrete channel transport.
    #[serde(default)]
    pub transport_properties: BTreeMap<String, String>,
}

impl RepositoryConfig {
    /// Builds a config with default bounds for the given topic and
    /// transport connection string.
    pub fn new(topic: impl Into<String>, bootstrap_servers: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            bootstrap_servers: bootstrap_servers.into(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            warmup_timeout_ms: DEFAULT_WARMUP_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            transport_properties: BTreeMap::new(),
        }
    }

    /// Parses and validates a config from a JSON blob.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_value(value).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Fails fast on settings the repository cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.bootstrap_servers.trim().is_empty() {
            return Err(ConfigError::EmptyBootstrapServers);
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        Ok(())
    }

    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_millis(self.warmup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_warmup_timeout_ms() -> u64 {
    DEFAULT_WARMUP_TIMEOUT_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

/// Construction-time configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("bootstrap servers must not be empty")]
    EmptyBootstrapServers,
    #[error("cache capacity must be at least 1")]
    ZeroCacheCapacity,
    #[error("malformed config: {0}")]
    Malformed(String),
}
