// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory event store
//!
//! Keeps every aggregate's history in a map guarded by a single
//! `tokio::sync::RwLock`. The version check and the push happen under the
//! same write guard, so racing appends against one aggregate serialize.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{CoreError, CoreResult};
use crate::event::{NewEvent, StoredEvent};
use crate::event_store::EventStore;

/// Event store held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<(String, String), Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of aggregates with at least one event
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
        expected_version: u64,
    ) -> CoreResult<u64> {
        let mut streams = self.streams.write().await;
        let key = (aggregate_type.to_string(), aggregate_id.to_string());
        let current = streams.get(&key).map(|s| s.len() as u64).unwrap_or(0);

        if current != expected_version {
            warn!(
                aggregate_type,
                aggregate_id,
                expected = expected_version,
                actual = current,
                "Rejected append: version mismatch"
            );
            return Err(CoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual: current,
            });
        }

        if events.is_empty() {
            return Ok(current);
        }

        let stream = streams.entry(key).or_default();
        for (offset, event) in events.into_iter().enumerate() {
            let sequence = expected_version + offset as u64 + 1;
            stream.push(StoredEvent::from_new(aggregate_type, aggregate_id, sequence, event));
        }

        let version = stream.len() as u64;
        debug!(aggregate_type, aggregate_id, version, "Appended events");
        Ok(version)
    }

    async fn read(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<Vec<StoredEvent>> {
        let streams = self.streams.read().await;
        let key = (aggregate_type.to_string(), aggregate_id.to_string());
        Ok(streams.get(&key).cloned().unwrap_or_default())
    }
}
