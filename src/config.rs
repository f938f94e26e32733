// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration for the aggregate core
//!
//! Defaults work against a local NATS server. [`CoreConfig::from_env`]
//! overrides them from environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `NATS_URL` | `nats.servers` (comma separated) |
//! | `CIM_EVENT_STREAM` | `event_store.stream_name` |
//! | `CIM_EVENT_SUBJECT_PREFIX` | `event_store.subject_prefix` |
//! | `CIM_LOCK_BUCKET` | `lock.bucket` |
//! | `CIM_LOCK_TTL_SECS` | `lock.default_ttl` |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};

pub use crate::nats::NatsConfig;

/// Configuration for the JetStream event stream
///
/// The stream is created with unlimited retention. Commits are never aged
/// out, since an aggregate's version is the count of every event it has
/// ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStoreConfig {
    /// JetStream stream name
    pub stream_name: String,

    /// Subject prefix; aggregates live under `<prefix>.<type>.<id>`
    pub subject_prefix: String,

    /// Number of replicas (for clustered NATS)
    pub replicas: usize,

    /// Commits fetched per round trip when reading a history
    pub read_batch_size: usize,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            stream_name: "AGGREGATE_EVENTS".to_string(),
            subject_prefix: "events".to_string(),
            replicas: 1,
            read_batch_size: 1000,
        }
    }
}

/// Configuration for the distributed lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// JetStream key-value bucket holding lock markers
    pub bucket: String,

    /// TTL used when a caller does not name one
    pub default_ttl: Duration,

    /// Upper bound on any lock TTL; also the bucket's max age
    pub max_ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            bucket: "AGGREGATE_LOCKS".to_string(),
            default_ttl: Duration::from_secs(30),
            max_ttl: Duration::from_secs(300),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub nats: NatsConfig,
    pub event_store: EventStoreConfig,
    pub lock: LockConfig,
}

impl CoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("NATS_URL") {
            config.nats.servers = url
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(stream) = lookup("CIM_EVENT_STREAM") {
            config.event_store.stream_name = stream;
        }
        if let Some(prefix) = lookup("CIM_EVENT_SUBJECT_PREFIX") {
            config.event_store.subject_prefix = prefix;
        }
        if let Some(bucket) = lookup("CIM_LOCK_BUCKET") {
            config.lock.bucket = bucket;
        }
        if let Some(ttl) = lookup("CIM_LOCK_TTL_SECS") {
            let secs: u64 = ttl.parse().map_err(|_| {
                CoreError::Configuration(format!("CIM_LOCK_TTL_SECS is not a number: '{}'", ttl))
            })?;
            config.lock.default_ttl = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> CoreResult<()> {
        if self.nats.servers.is_empty() {
            return Err(CoreError::Configuration("NATS_URL is empty".to_string()));
        }
        if self.lock.default_ttl.is_zero() {
            return Err(CoreError::Configuration("lock TTL must be positive".to_string()));
        }
        if self.lock.default_ttl > self.lock.max_ttl {
            return Err(CoreError::Configuration(format!(
                "lock TTL {:?} exceeds maximum {:?}",
                self.lock.default_ttl, self.lock.max_ttl
            )));
        }
        if self.event_store.read_batch_size == 0 {
            return Err(CoreError::Configuration("read batch size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, defaulting to INFO
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
