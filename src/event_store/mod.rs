// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Store Abstraction
//!
//! This module defines the append-only event log contract that aggregate
//! persistence is built on, and its implementations.
//!
//! # Architecture
//!
//! ```text
//! Command → Aggregate → Events → EventStore → Persistent Storage
//!                                    ↓
//!                               Event Bus
//! ```
//!
//! # Event Store Requirements
//!
//! 1. **Append-Only**: Events are never updated or deleted
//! 2. **Ordered**: Events keep their append order within an aggregate
//! 3. **Version-Gated**: An append names the version it was computed against
//!    and is rejected as a whole if the stored version differs
//! 4. **Atomic**: When two appends race with the same expected version, at
//!    most one succeeds
//! 5. **Replay**: `read` returns a finite, re-readable history

use async_trait::async_trait;

use crate::errors::CoreResult;
use crate::event::{NewEvent, StoredEvent};

pub mod memory;
pub mod nats;

pub use memory::InMemoryEventStore;
pub use nats::NatsEventStore;

/// Event Store trait for persisting and retrieving domain events
///
/// Aggregates are addressed by `(aggregate_type, aggregate_id)`. The version
/// of an aggregate is the number of events ever appended for it.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate's history
    ///
    /// Succeeds only if the stored version equals `expected_version`, and
    /// then appends all events or none.
    ///
    /// # Returns
    ///
    /// The new version, `expected_version + events.len()`
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the stored version differs
    /// - `Storage` / `NatsConnection` if the backing store fails
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
        expected_version: u64,
    ) -> CoreResult<u64>;

    /// Read all events for an aggregate in ascending sequence
    ///
    /// An aggregate with no history yields an empty vector.
    async fn read(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<Vec<StoredEvent>>;

    /// Read events starting at `from_version` (inclusive, 1-based)
    async fn read_from(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        from_version: u64,
    ) -> CoreResult<Vec<StoredEvent>> {
        let events = self.read(aggregate_type, aggregate_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.sequence >= from_version)
            .collect())
    }

    /// Current version of an aggregate, 0 when it has no events
    async fn current_version(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<u64> {
        let events = self.read(aggregate_type, aggregate_id).await?;
        Ok(events.last().map(|e| e.sequence).unwrap_or(0))
    }
}

#[async_trait]
impl<S> EventStore for std::sync::Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
        expected_version: u64,
    ) -> CoreResult<u64> {
        (**self)
            .append(aggregate_type, aggregate_id, events, expected_version)
            .await
    }

    async fn read(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<Vec<StoredEvent>> {
        (**self).read(aggregate_type, aggregate_id).await
    }

    async fn read_from(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        from_version: u64,
    ) -> CoreResult<Vec<StoredEvent>> {
        (**self)
            .read_from(aggregate_type, aggregate_id, from_version)
            .await
    }

    async fn current_version(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<u64> {
        (**self).current_version(aggregate_type, aggregate_id).await
    }
}
