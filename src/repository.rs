// Copyright (c) 2025 - Cowboy AI, Inc.
//! Aggregate Repository (rehydration and persistence)
//!
//! ```text
//! load:  EventStore::read ──decode──▶ A::apply (fold) ──▶ AggregateRoot
//! save:  pending ──encode──▶ EventStore::append(expected = version)
//!                                   │ ok
//!                                   ▼
//!                         clear pending, advance version
//!                                   │
//!                                   ▼
//!                         EventBus::publish (each event, in order)
//! ```
//!
//! A conflicting save leaves the root untouched (still dirty) so the caller
//! can reload and retry or give up. Nothing here retries on its own.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::errors::{CoreError, CoreResult};
use crate::event::{DomainEvent, EventMetadata, NewEvent, StoredEvent};
use crate::event_bus::EventBus;
use crate::event_store::EventStore;
use crate::identity::{Clock, IdGenerator, SystemClock, UuidV7Generator};

/// Loads aggregates by replay and persists their pending events
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn EventStore>,
    event_bus: Option<Arc<EventBus>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Repository {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            event_bus: None,
            ids: Arc::new(UuidV7Generator),
            clock: Arc::new(SystemClock),
        }
    }

    /// Publish persisted events on this bus
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Stamp event ids from this generator
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Stamp event times from this clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Rebuild an aggregate from its full history
    ///
    /// An aggregate with no history loads as its empty state at version 0.
    ///
    /// # Errors
    ///
    /// - `RehydrationFailure` if a stored event cannot be decoded into
    ///   `A::Event` or the history has a gap
    /// - store errors from reading the history, unchanged
    pub async fn load<A: Aggregate>(&self, aggregate_id: &str) -> CoreResult<AggregateRoot<A>> {
        let records = self.store.read(A::AGGREGATE_TYPE, aggregate_id).await?;

        let mut events = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            let expected = position as u64 + 1;
            if record.sequence != expected {
                return Err(CoreError::rehydration(
                    A::AGGREGATE_TYPE,
                    aggregate_id,
                    format!("expected event #{}, found #{}", expected, record.sequence),
                ));
            }

            let event: A::Event = record
                .decode()
                .map_err(|e| CoreError::rehydration(A::AGGREGATE_TYPE, aggregate_id, e))?;

            if event.event_type() != record.event_type {
                return Err(CoreError::rehydration(
                    A::AGGREGATE_TYPE,
                    aggregate_id,
                    format!(
                        "event #{} recorded as '{}' decodes as '{}'",
                        record.sequence,
                        record.event_type,
                        event.event_type()
                    ),
                ));
            }
            events.push(event);
        }

        let root = AggregateRoot::<A>::replay(aggregate_id, &events);

        debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id,
            version = root.version(),
            "Loaded aggregate"
        );

        Ok(root)
    }

    /// Persist the root's pending events
    ///
    /// Returns the number of events persisted; 0 without touching the store
    /// when nothing is pending.
    pub async fn save<A: Aggregate>(&self, root: &mut AggregateRoot<A>) -> CoreResult<usize> {
        self.save_with_metadata(root, EventMetadata::default()).await
    }

    /// Persist the root's pending events, tagging each with `metadata`
    pub async fn save_with_metadata<A: Aggregate>(
        &self,
        root: &mut AggregateRoot<A>,
        metadata: EventMetadata,
    ) -> CoreResult<usize> {
        if !root.has_pending() {
            return Ok(0);
        }

        let expected_version = root.version();
        let new_events = root
            .pending()
            .iter()
            .map(|event| NewEvent::encode(event, self.ids.as_ref(), self.clock.as_ref(), metadata))
            .collect::<CoreResult<Vec<_>>>()?;
        let count = new_events.len();

        let persisted: Vec<StoredEvent> = new_events
            .iter()
            .cloned()
            .enumerate()
            .map(|(offset, event)| {
                StoredEvent::from_new(
                    A::AGGREGATE_TYPE,
                    root.id(),
                    expected_version + offset as u64 + 1,
                    event,
                )
            })
            .collect();

        let version = self
            .store
            .append(A::AGGREGATE_TYPE, root.id(), new_events, expected_version)
            .await?;

        root.commit(count);

        info!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %root.id(),
            version,
            persisted = count,
            "Saved aggregate"
        );

        if let Some(bus) = &self.event_bus {
            for event in &persisted {
                if let Err(e) = bus.publish(event).await {
                    warn!(
                        aggregate_id = %root.id(),
                        version,
                        sequence = event.sequence,
                        "Publish failed after commit"
                    );
                    return Err(CoreError::PublishAfterCommit {
                        aggregate_id: root.id().to_string(),
                        version,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(count)
    }

    /// Raw history of one aggregate
    pub async fn history(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<Vec<StoredEvent>> {
        self.store.read(aggregate_type, aggregate_id).await
    }
}
