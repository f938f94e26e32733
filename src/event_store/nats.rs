// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS JetStream Event Store Implementation
//!
//! This module implements the EventStore trait using NATS JetStream as the
//! persistent storage backend.
//!
//! # Layout
//!
//! - One subject per aggregate: `<prefix>.<aggregate_type>.<aggregate_id>`
//! - One message per append: a [`Commit`] carrying the whole batch, so a
//!   batch lands atomically
//! - The conflict check runs inside JetStream via the
//!   `Nats-Expected-Last-Subject-Sequence` header: the publish names the
//!   stream sequence of the commit the writer last saw, and JetStream rejects
//!   it if another commit landed on the subject since
//!
//! # Server requirements
//!
//! - nats-server 2.10 or newer. The first append on a subject sends an
//!   expected last subject sequence of `0`; older servers ignore that value,
//!   so two racing first appends could both land.
//! - The stream must keep every commit. [`NatsEventStore::new`] creates it
//!   with unlimited age, size and message limits and with deletes refused.
//!   An existing stream is used as found, so one created elsewhere must not
//!   set a retention limit.

use std::time::Duration;

use async_nats::jetstream::{self, consumer, context::Publish, stream::Stream};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{EventStoreConfig, NatsConfig};
use crate::errors::{CoreError, CoreResult};
use crate::event::{NewEvent, StoredEvent};
use crate::event_store::EventStore;
use crate::nats::NatsClient;

/// Idle time after which the server drops a read consumer we failed to delete
const CONSUMER_INACTIVE_THRESHOLD: Duration = Duration::from_secs(5);

/// One append batch as written to JetStream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub events: Vec<StoredEvent>,
}

impl Commit {
    /// Version of the aggregate after this commit
    pub fn version(&self) -> u64 {
        self.events.last().map(|e| e.sequence).unwrap_or(0)
    }
}

/// Tip of an aggregate's subject: its stream sequence and aggregate version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tip {
    stream_sequence: u64,
    version: u64,
}

/// NATS JetStream-backed event store
///
/// # Example
///
/// ```rust,no_run
/// use cim_aggregate::config::{EventStoreConfig, NatsConfig};
/// use cim_aggregate::event_store::NatsEventStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = NatsEventStore::connect(&NatsConfig::default(), EventStoreConfig::default()).await?;
///     // Use store...
///     Ok(())
/// }
/// ```
pub struct NatsEventStore {
    jetstream: jetstream::Context,
    stream: Stream,
    config: EventStoreConfig,
}

impl NatsEventStore {
    /// Connect to NATS and create or open the event stream
    pub async fn connect(nats: &NatsConfig, config: EventStoreConfig) -> CoreResult<Self> {
        let client = NatsClient::new(nats.clone()).await?;
        Self::new(client.jetstream(), config).await
    }

    /// Create the event store on an existing JetStream context
    pub async fn new(jetstream: jetstream::Context, config: EventStoreConfig) -> CoreResult<Self> {
        let stream = jetstream
            .get_or_create_stream(stream_config(&config))
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        info!(stream = %config.stream_name, "Event stream ready");

        Ok(Self {
            jetstream,
            stream,
            config,
        })
    }

    /// Build the subject for an aggregate
    ///
    /// Format: `<prefix>.<aggregate_type>.<aggregate_id>`
    fn subject(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<String> {
        Ok(format!(
            "{}.{}.{}",
            self.config.subject_prefix,
            subject_token(aggregate_type)?,
            subject_token(aggregate_id)?
        ))
    }

    /// Fetch every commit pending on a read consumer
    async fn drain(
        &self,
        subject: &str,
        consumer: &consumer::PullConsumer,
    ) -> CoreResult<Vec<StoredEvent>> {
        // Commits present when the consumer was created; later ones are not
        // part of this read
        let mut remaining = consumer.cached_info().num_pending as usize;
        let mut events = Vec::new();

        while remaining > 0 {
            let mut messages = consumer
                .fetch()
                .max_messages(remaining.min(self.config.read_batch_size))
                .messages()
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;

            let mut fetched = 0;
            while let Some(message) = messages.next().await {
                let message = message.map_err(|e| CoreError::Storage(e.to_string()))?;
                let commit: Commit = serde_json::from_slice(&message.payload)?;
                events.extend(commit.events);
                fetched += 1;
            }

            if fetched == 0 {
                break;
            }
            remaining = remaining.saturating_sub(fetched);
        }

        ensure_complete(subject, remaining)?;
        Ok(events)
    }

    /// Look up the latest commit on an aggregate's subject
    async fn tip(&self, subject: &str) -> CoreResult<Option<Tip>> {
        match self.stream.get_last_raw_message_by_subject(subject).await {
            Ok(message) => {
                let commit: Commit = serde_json::from_slice(&message.payload)?;
                Ok(Some(Tip {
                    stream_sequence: message.sequence,
                    version: commit.version(),
                }))
            }
            Err(e)
                if e.kind() == jetstream::stream::LastRawMessageErrorKind::NoMessageFound =>
            {
                Ok(None)
            }
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }
}

/// Stream settings for the event log
///
/// Limits stay at their unlimited defaults and deletes are refused, so no
/// commit ever leaves the stream.
fn stream_config(config: &EventStoreConfig) -> jetstream::stream::Config {
    jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: vec![format!("{}.>", config.subject_prefix)],
        num_replicas: config.replicas,
        deny_delete: true,
        deny_purge: true,
        ..Default::default()
    }
}

/// Fail when a read stopped before every commit it was owed
fn ensure_complete(subject: &str, remaining: usize) -> CoreResult<()> {
    if remaining > 0 {
        return Err(CoreError::Storage(format!(
            "history read incomplete on {}: {} commits missing",
            subject, remaining
        )));
    }
    Ok(())
}

/// Reject characters that carry meaning in NATS subjects
fn subject_token(token: &str) -> CoreResult<&str> {
    let invalid = token.is_empty()
        || token
            .chars()
            .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace());

    if invalid {
        return Err(CoreError::Storage(format!(
            "'{}' cannot be used as a NATS subject token",
            token
        )));
    }
    Ok(token)
}

#[async_trait]
impl EventStore for NatsEventStore {
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
        expected_version: u64,
    ) -> CoreResult<u64> {
        let subject = self.subject(aggregate_type, aggregate_id)?;
        let tip = self.tip(&subject).await?;
        let current = tip.map(|t| t.version).unwrap_or(0);

        if current != expected_version {
            warn!(
                subject = %subject,
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

        let commit = Commit {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            events: events
                .into_iter()
                .enumerate()
                .map(|(offset, event)| {
                    let sequence = expected_version + offset as u64 + 1;
                    StoredEvent::from_new(aggregate_type, aggregate_id, sequence, event)
                })
                .collect(),
        };
        let version = commit.version();
        let payload = serde_json::to_vec(&commit)?;

        // Zero means "no message on this subject yet"
        let last_subject_sequence = tip.map(|t| t.stream_sequence).unwrap_or(0);
        let publish = Publish::build()
            .payload(payload.into())
            .expected_last_subject_sequence(last_subject_sequence);

        let ack = self
            .jetstream
            .send_publish(subject.clone(), publish)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?
            .await;

        match ack {
            Ok(ack) => {
                debug!(
                    subject = %subject,
                    version,
                    stream_sequence = ack.sequence,
                    "Appended commit"
                );
                Ok(version)
            }
            Err(e) if e.kind() == jetstream::context::PublishErrorKind::WrongLastSequence => {
                let actual = self.tip(&subject).await?.map(|t| t.version).unwrap_or(0);
                warn!(
                    subject = %subject,
                    expected = expected_version,
                    actual,
                    "Rejected append: lost race to another writer"
                );
                Err(CoreError::ConcurrencyConflict {
                    aggregate_id: aggregate_id.to_string(),
                    expected: expected_version,
                    actual,
                })
            }
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }

    async fn read(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<Vec<StoredEvent>> {
        let subject = self.subject(aggregate_type, aggregate_id)?;

        let consumer = self
            .stream
            .create_consumer(consumer::pull::Config {
                filter_subject: subject.clone(),
                deliver_policy: consumer::DeliverPolicy::All,
                ack_policy: consumer::AckPolicy::None,
                inactive_threshold: CONSUMER_INACTIVE_THRESHOLD,
                ..Default::default()
            })
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        let result = self.drain(&subject, &consumer).await;

        let name = consumer.cached_info().name.clone();
        if let Err(e) = self.stream.delete_consumer(&name).await {
            warn!(consumer = %name, error = %e, "Failed to delete read consumer; server will expire it");
        }

        let mut events = result?;
        events.sort_by_key(|e| e.sequence);
        debug!(subject = %subject, count = events.len(), "Read aggregate history");

        Ok(events)
    }

    async fn current_version(&self, aggregate_type: &str, aggregate_id: &str) -> CoreResult<u64> {
        let subject = self.subject(aggregate_type, aggregate_id)?;
        Ok(self.tip(&subject).await?.map(|t| t.version).unwrap_or(0))
    }
}
