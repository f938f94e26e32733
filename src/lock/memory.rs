// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process lock backend
//!
//! Markers live in a map with their expiry instant. An expired marker counts
//! as absent, which is what a store with native key expiry would show.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::{CoreError, CoreResult};
use crate::lock::{LockBackend, LockKey, LockToken};

#[derive(Debug, Clone, Copy)]
struct Marker {
    token: LockToken,
    expires_at: Instant,
}

impl Marker {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Lock backend for a single process and for tests
#[derive(Debug, Default)]
pub struct InMemoryLockBackend {
    markers: Mutex<HashMap<LockKey, Marker>>,
}

impl InMemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live marker exists for `key`
    pub async fn is_held(&self, key: &LockKey) -> bool {
        let now = Instant::now();
        self.markers
            .lock()
            .await
            .get(key)
            .map(|m| m.is_live(now))
            .unwrap_or(false)
    }

    /// Force the marker for `key` past its expiry
    pub async fn expire(&self, key: &LockKey) {
        if let Some(marker) = self.markers.lock().await.get_mut(key) {
            marker.expires_at = Instant::now();
        }
    }
}

#[async_trait]
impl LockBackend for InMemoryLockBackend {
    async fn set_if_absent(&self, key: &LockKey, token: LockToken, ttl: Duration) -> CoreResult<bool> {
        let now = Instant::now();
        let mut markers = self.markers.lock().await;

        if markers.get(key).is_some_and(|m| m.is_live(now)) {
            return Ok(false);
        }

        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            CoreError::Configuration(format!("lock TTL {:?} is out of range", ttl))
        })?;
        markers.insert(key.clone(), Marker { token, expires_at });
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &LockKey, token: LockToken) -> CoreResult<bool> {
        let now = Instant::now();
        let mut markers = self.markers.lock().await;

        match markers.get(key).copied() {
            Some(marker) if marker.token == token => {
                // Ours but possibly expired: clean up, report whether the
                // lease was still valid
                markers.remove(key);
                Ok(marker.is_live(now))
            }
            _ => Ok(false),
        }
    }
}
