// Copyright (c) 2025 - Cowboy AI, Inc.
//! Distributed Lock Manager
//!
//! A leased, TTL-bounded named lock backed by a shared key-value store.
//! Acquisition writes a marker only if none exists; release deletes it only
//! if it still carries the token minted at acquisition (fencing), so a caller
//! whose lease expired cannot release a lock someone else now holds.
//!
//! The lock is advisory: it protects callers that route every mutation of an
//! aggregate through [`LockKey::aggregate`]. The event store's version check
//! stays the safety net for everything else.
//!
//! ```text
//! try_lock(key, ttl) ──▶ LockGuard{token} ──▶ ... ──▶ unlock(guard)
//!        │
//!        └── marker present ──▶ LockAcquisitionFailure (no retry)
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};

pub mod memory;
pub mod nats;

pub use memory::InMemoryLockBackend;
pub use nats::NatsKvLockBackend;

/// Name of a lock in the shared store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Lock guarding one aggregate: `lock:aggregate:<type>:<id>`
    pub fn aggregate(aggregate_type: &str, aggregate_id: &str) -> Self {
        Self(format!("lock:aggregate:{}:{}", aggregate_type, aggregate_id))
    }

    /// Free-form lock: `lock:<name>`
    pub fn named(name: &str) -> Self {
        Self(format!("lock:{}", name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque per-acquisition owner token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(Uuid);

impl LockToken {
    /// Mint a fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof of a successful acquisition; required to release
#[derive(Debug, Clone)]
pub struct LockGuard {
    key: LockKey,
    token: LockToken,
    ttl: Duration,
    acquired_at: Instant,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn token(&self) -> LockToken {
        self.token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lease time left, zero once the TTL has passed
    pub fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.acquired_at.elapsed())
    }
}

/// Shared store holding lock markers
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Write a marker for `key` holding `token` if no live marker exists
    ///
    /// Returns `false` when another live marker is present.
    async fn set_if_absent(&self, key: &LockKey, token: LockToken, ttl: Duration) -> CoreResult<bool>;

    /// Delete the marker for `key` only if it holds `token`
    ///
    /// Returns `false` when the marker is gone, belongs to someone else, or
    /// was ours but its lease had already passed (it is removed anyway).
    async fn compare_and_delete(&self, key: &LockKey, token: LockToken) -> CoreResult<bool>;
}

/// Acquires and releases leased locks
#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    max_ttl: Option<Duration>,
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            max_ttl: None,
        }
    }

    /// Refuse TTLs above `max_ttl`
    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = Some(max_ttl);
        self
    }

    /// Try once to acquire `key`
    ///
    /// Fails immediately with `LockAcquisitionFailure` if the lock is held.
    pub async fn try_lock(&self, key: &LockKey, ttl: Duration) -> CoreResult<LockGuard> {
        if ttl.is_zero() {
            return Err(CoreError::Configuration("lock TTL must be positive".to_string()));
        }
        if let Some(max) = self.max_ttl {
            if ttl > max {
                return Err(CoreError::Configuration(format!(
                    "lock TTL {:?} exceeds maximum {:?}",
                    ttl, max
                )));
            }
        }

        let token = LockToken::generate();
        if !self.backend.set_if_absent(key, token, ttl).await? {
            debug!(key = %key, "Lock is held elsewhere");
            return Err(CoreError::LockAcquisitionFailure {
                key: key.to_string(),
            });
        }

        debug!(key = %key, token = %token, ttl_ms = ttl.as_millis() as u64, "Acquired lock");
        Ok(LockGuard {
            key: key.clone(),
            token,
            ttl,
            acquired_at: Instant::now(),
        })
    }

    /// Release a lock held by `guard`
    ///
    /// Returns `false` if the lease had already expired or the lock was taken
    /// over; the other holder's marker is left alone.
    pub async fn unlock(&self, guard: &LockGuard) -> CoreResult<bool> {
        let released = self.backend.compare_and_delete(&guard.key, guard.token).await?;
        if released {
            debug!(key = %guard.key, "Released lock");
        } else {
            warn!(
                key = %guard.key,
                token = %guard.token,
                "Lock was no longer ours at release; lease expired or taken over"
            );
        }
        Ok(released)
    }

    /// Run `action` while holding `key`
    ///
    /// The lock is released after `action` finishes, whether it returns `Ok`,
    /// returns `Err` or panics. A release failure is logged and does not
    /// replace the action's result; the TTL reclaims the marker.
    pub async fn execute_locked<F, Fut, T>(
        &self,
        key: &LockKey,
        ttl: Duration,
        action: F,
    ) -> CoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let guard = self.try_lock(key, ttl).await?;

        let outcome = AssertUnwindSafe(async move { action().await })
            .catch_unwind()
            .await;

        if let Err(e) = self.unlock(&guard).await {
            warn!(key = %guard.key, error = %e, "Failed to release lock; TTL will reclaim it");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
