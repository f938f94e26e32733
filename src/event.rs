// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain Events and their stored envelope
//!
//! A domain event is an immutable fact about exactly one aggregate. Each
//! aggregate declares a closed enum of its events implementing
//! [`DomainEvent`]; the event log only ever sees the opaque
//! [`StoredEvent`] record.
//!
//! ```text
//! Aggregate::Event ──encode──▶ NewEvent ──append──▶ StoredEvent
//!        ▲                                              │
//!        └──────────────────decode──────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};
use crate::identity::{Clock, IdGenerator};

/// A domain event variant set for one aggregate
///
/// Implement this on a serde-tagged enum so that decoding a record whose
/// kind is not part of the set fails instead of being silently skipped.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
    /// Stable discriminator for the concrete event kind
    fn event_type(&self) -> &'static str;
}

/// Correlation and causation tracking for events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Groups related events across aggregates
    pub correlation_id: Option<Uuid>,

    /// Direct cause of this event (usually the command id)
    pub causation_id: Option<Uuid>,
}

impl EventMetadata {
    pub fn new(correlation_id: Uuid, causation_id: Uuid) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            causation_id: Some(causation_id),
        }
    }
}

/// An encoded event waiting for a position in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Encode a typed event, stamping identity and time from the providers
    pub fn encode<E: DomainEvent>(
        event: &E,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
        metadata: EventMetadata,
    ) -> CoreResult<Self> {
        Ok(Self {
            event_id: ids.next_id(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
            occurred_at: clock.now(),
            metadata,
        })
    }
}

/// Stored event envelope
///
/// This is the minimum record shape every event store keeps: aggregate
/// identity, ordinal position, kind discriminator, payload and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event ID
    pub event_id: Uuid,

    /// Aggregate kind this event belongs to
    pub aggregate_type: String,

    /// Aggregate ID this event belongs to
    pub aggregate_id: String,

    /// 1-based position in the aggregate's history
    pub sequence: u64,

    /// Event kind discriminator
    pub event_type: String,

    /// Serialized event
    pub payload: serde_json::Value,

    /// When the event occurred
    pub occurred_at: DateTime<Utc>,

    /// Correlation tracking
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl StoredEvent {
    /// Assign a position to a new event
    pub fn from_new(aggregate_type: &str, aggregate_id: &str, sequence: u64, event: NewEvent) -> Self {
        Self {
            event_id: event.event_id,
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            sequence,
            event_type: event.event_type,
            payload: event.payload,
            occurred_at: event.occurred_at,
            metadata: event.metadata,
        }
    }

    /// Decode the payload into the aggregate's event type
    pub fn decode<E: DomainEvent>(&self) -> CoreResult<E> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            CoreError::Serialization(format!(
                "event #{} of kind '{}': {}",
                self.sequence, self.event_type, e
            ))
        })
    }
}
