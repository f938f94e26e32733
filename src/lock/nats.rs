// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS JetStream key-value lock backend
//!
//! Each lock is one key in a KV bucket. The value records the owner token and
//! the lease expiry, so per-lock TTLs work on a bucket with a single
//! `max_age`; the bucket age only sweeps markers that nobody reclaimed.
//!
//! - Acquire: `create` (fails if the key exists). If a marker exists but its
//!   lease has passed, take it over with a revision-checked `update`.
//! - Release: read the marker, compare tokens, then delete with the read
//!   revision as the expected last revision.
//!
//! KV keys cannot contain `:`, so `lock:aggregate:user:u1` is stored as
//! `lock.aggregate.user.u1`.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{LockConfig, NatsConfig};
use crate::errors::{CoreError, CoreResult};
use crate::identity::{Clock, SystemClock};
use crate::lock::{LockBackend, LockKey, LockToken};
use crate::nats::NatsClient;

/// Marker value stored under a lock key
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Marker {
    token: LockToken,
    expires_at: DateTime<Utc>,
}

/// Lock backend over a JetStream key-value bucket
pub struct NatsKvLockBackend {
    store: kv::Store,
    clock: Arc<dyn Clock>,
}

impl NatsKvLockBackend {
    /// Connect to NATS and open or create the lock bucket
    pub async fn connect(nats: &NatsConfig, config: &LockConfig) -> CoreResult<Self> {
        let client = NatsClient::new(nats.clone()).await?;
        Self::new(client.jetstream(), config).await
    }

    /// Open or create the lock bucket on an existing JetStream context
    pub async fn new(jetstream: jetstream::Context, config: &LockConfig) -> CoreResult<Self> {
        // A KV bucket is backed by the stream `KV_<bucket>`
        let exists = match jetstream.get_stream(format!("KV_{}", config.bucket)).await {
            Ok(_) => true,
            Err(e) if is_stream_not_found(&e) => false,
            Err(e) => return Err(CoreError::Storage(e.to_string())),
        };

        let store = if exists {
            jetstream
                .get_key_value(&config.bucket)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?
        } else {
            jetstream
                .create_key_value(kv::Config {
                    bucket: config.bucket.clone(),
                    history: 1,
                    max_age: config.max_ttl,
                    ..Default::default()
                })
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?
        };

        info!(bucket = %config.bucket, "Lock bucket ready");

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a different clock for lease expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn marker_bytes(&self, token: LockToken, ttl: Duration) -> CoreResult<bytes::Bytes> {
        let marker = Marker {
            token,
            expires_at: lease_expiry(self.clock.now(), ttl)?,
        };
        Ok(serde_json::to_vec(&marker)?.into())
    }

    /// Current live marker and its revision, if any
    async fn current(&self, key: &str) -> CoreResult<Option<(Marker, u64)>> {
        let entry = self
            .store
            .entry(key)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        match entry {
            Some(entry) if matches!(entry.operation, kv::Operation::Put) => {
                let marker: Marker = serde_json::from_slice(&entry.value)?;
                Ok(Some((marker, entry.revision)))
            }
            _ => Ok(None),
        }
    }
}

fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> CoreResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| CoreError::Configuration(format!("lock TTL {:?} is out of range", ttl)))
}

fn is_stream_not_found(err: &jetstream::context::GetStreamError) -> bool {
    matches!(
        err.kind(),
        jetstream::context::GetStreamErrorKind::JetStream(e)
            if e.error_code() == jetstream::ErrorCode::STREAM_NOT_FOUND
    )
}

/// Map a failed takeover `update` to "held by someone else" or an error
///
/// Only a revision mismatch means another caller won the race.
fn takeover_outcome(kind: kv::UpdateErrorKind) -> Result<bool, kv::UpdateErrorKind> {
    match kind {
        kv::UpdateErrorKind::WrongLastRevision => Ok(false),
        other => Err(other),
    }
}

/// Translate a lock key into a valid KV key
fn kv_key(key: &LockKey) -> CoreResult<String> {
    let translated = key.as_str().replace(':', ".");
    let valid = !translated.is_empty()
        && translated
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '=' | '.'));

    if !valid {
        return Err(CoreError::Storage(format!(
            "'{}' cannot be used as a lock key",
            key
        )));
    }
    Ok(translated)
}

#[async_trait]
impl LockBackend for NatsKvLockBackend {
    async fn set_if_absent(&self, key: &LockKey, token: LockToken, ttl: Duration) -> CoreResult<bool> {
        let kv_key = kv_key(key)?;
        let value = self.marker_bytes(token, ttl)?;

        match self.store.create(&kv_key, value.clone()).await {
            Ok(_) => return Ok(true),
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {}
            Err(e) => return Err(CoreError::Storage(e.to_string())),
        }

        let Some((marker, revision)) = self.current(&kv_key).await? else {
            // Deleted between our create and read; let the caller retry
            return Ok(false);
        };

        if marker.expires_at > self.clock.now() {
            return Ok(false);
        }

        // Lease passed: take over only if nobody else touched the key
        match self.store.update(&kv_key, value, revision).await {
            Ok(_) => {
                debug!(key = %key, "Took over expired lock");
                Ok(true)
            }
            Err(e) => takeover_outcome(e.kind()).map_err(|_| CoreError::Storage(e.to_string())),
        }
    }

    async fn compare_and_delete(&self, key: &LockKey, token: LockToken) -> CoreResult<bool> {
        let kv_key = kv_key(key)?;

        let Some((marker, revision)) = self.current(&kv_key).await? else {
            return Ok(false);
        };
        if marker.token != token {
            return Ok(false);
        }

        match self.store.delete_expect_revision(&kv_key, Some(revision)).await {
            Ok(()) => Ok(marker.expires_at > self.clock.now()),
            Err(e) => {
                // A newer revision means another holder replaced our marker
                match self.current(&kv_key).await? {
                    Some((_, latest)) if latest != revision => Ok(false),
                    None => Ok(false),
                    _ => Err(CoreError::Storage(e.to_string())),
                }
            }
        }
    }
}
