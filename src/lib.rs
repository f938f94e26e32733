// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-sourced aggregates for the Composable Information Machine
//!
//! Commands and queries are routed by type to exactly one handler. Command
//! handlers take a leased lock on the target aggregate, rebuild it by
//! replaying its history, record new events and persist them under an
//! optimistic version check before publishing them to subscribers.
//!
//! ```text
//! Command ──▶ CommandBus ──▶ handler ──▶ lock ──▶ Repository::load (replay)
//!                                                 │
//!                                       record events on AggregateRoot
//!                                                 │
//!                         Repository::save (expected version) ──▶ EventBus
//! Query   ──▶ QueryBus   ──▶ handler (no lock, no log)
//! ```
//!
//! NATS JetStream backs the event log ([`event_store::NatsEventStore`]) and
//! the locks ([`lock::NatsKvLockBackend`]); in-memory backends serve a single
//! process and tests.

pub mod aggregate;
pub mod bus;
pub mod command;
pub mod config;
pub mod errors;
pub mod event;
pub mod event_bus;
pub mod event_store;
pub mod executor;
pub mod identity;
pub mod lock;
pub mod nats;
pub mod query;
pub mod repository;

// Re-export commonly used types
pub use aggregate::{Aggregate, AggregateRoot, AggregateStatus};
pub use bus::{CommandBus, QueryBus};
pub use command::{Command, CommandHandler};
pub use config::{CoreConfig, EventStoreConfig, LockConfig};
pub use errors::{CoreError, CoreResult};
pub use event::{DomainEvent, EventMetadata, NewEvent, StoredEvent};
pub use event_bus::{EventBus, EventHandler, FnEventHandler, SubscriptionId};
pub use event_store::{EventStore, InMemoryEventStore, NatsEventStore};
pub use executor::{AggregateExecutor, Executed};
pub use identity::{
    Clock, FixedClock, IdGenerator, MessageMetadata, SequentialIdGenerator, SystemClock,
    UuidV7Generator,
};
pub use lock::{
    InMemoryLockBackend, LockBackend, LockGuard, LockKey, LockManager, LockToken,
    NatsKvLockBackend,
};
pub use nats::{NatsClient, NatsConfig};
pub use query::{Query, QueryHandler};
pub use repository::Repository;
