// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-Sourced Aggregates
//!
//! An aggregate's state is never stored; it is the fold of its events:
//!
//! ```text
//! State = fold(Events, A::new(id), A::apply)
//! ```
//!
//! [`Aggregate::apply`] is a `match` over the aggregate's closed event enum,
//! so an event kind without a state transition does not compile.
//!
//! [`AggregateRoot`] wraps the state with the bookkeeping persistence needs:
//! the persisted version and the queue of events recorded since the last
//! load or save.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──load──▶ Hydrated ──record──▶ Dirty ──save──▶ Hydrated
//! ```

use crate::event::DomainEvent;

/// Command-side entity rebuilt from its own history
pub trait Aggregate: Send + Sync + Sized + 'static {
    /// Aggregate kind; part of the store key and of the lock key
    const AGGREGATE_TYPE: &'static str;

    /// Closed set of events this aggregate produces and replays
    type Event: DomainEvent;

    /// Empty state for a fresh aggregate
    fn new(id: &str) -> Self;

    /// Apply one event to in-memory state
    ///
    /// Called both on replay and when a new event is recorded. Must not fail:
    /// events are facts that already happened.
    fn apply(&mut self, event: &Self::Event);
}

/// Where an aggregate root is in its load/mutate/persist cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    /// Created but not loaded from the store
    Uninitialized,
    /// In sync with the store
    Hydrated,
    /// Holds events not yet persisted
    Dirty,
}

/// Aggregate state plus version and pending events
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: String,
    version: u64,
    state: A,
    pending: Vec<A::Event>,
    hydrated: bool,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Fresh root that has not been loaded yet
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let state = A::new(&id);
        Self {
            id,
            version: 0,
            state,
            pending: Vec::new(),
            hydrated: false,
        }
    }

    /// Rebuild a root from historical events
    ///
    /// Replayed events are applied but never queued.
    pub fn replay<'a, I>(id: impl Into<String>, history: I) -> Self
    where
        I: IntoIterator<Item = &'a A::Event>,
    {
        let mut root = Self::new(id);
        for event in history {
            root.state.apply(event);
            root.version += 1;
        }
        root.hydrated = true;
        root
    }

    /// Apply an event to state and queue it for persistence
    pub fn record(&mut self, event: A::Event) {
        self.state.apply(&event);
        self.pending.push(event);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of events persisted for this aggregate
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Current state, including pending events
    pub fn state(&self) -> &A {
        &self.state
    }

    /// Events recorded since the last load or save
    pub fn pending(&self) -> &[A::Event] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn status(&self) -> AggregateStatus {
        if self.has_pending() {
            AggregateStatus::Dirty
        } else if self.hydrated {
            AggregateStatus::Hydrated
        } else {
            AggregateStatus::Uninitialized
        }
    }

    /// Mark `persisted` pending events as durable
    pub(crate) fn commit(&mut self, persisted: usize) {
        let persisted = persisted.min(self.pending.len());
        self.pending.drain(..persisted);
        self.version += persisted as u64;
        self.hydrated = true;
    }
}
