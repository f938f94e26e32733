// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process Event Bus
//!
//! Fans persisted events out to handlers subscribed to the event's exact
//! kind. Delivery is inline: `publish` awaits each handler in subscription
//! order on the caller's task and returns only when all of them have run.
//!
//! Handlers are not isolated from each other. The first handler error stops
//! delivery for that publish call and is returned to the publisher.
//!
//! The subscriber registry is one shared structure behind an `Arc`,
//! typically populated at startup. Subscribing while a publish is in flight
//! is safe; the in-flight publish sees the list as it was when it started.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::CoreResult;
use crate::event::StoredEvent;

/// Event handler trait
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a persisted event
    async fn handle(&self, event: &StoredEvent) -> CoreResult<()>;
}

/// Function-based event handler
pub struct FnEventHandler<F>
where
    F: Fn(&StoredEvent) -> CoreResult<()> + Send + Sync,
{
    handler: F,
}

impl<F> FnEventHandler<F>
where
    F: Fn(&StoredEvent) -> CoreResult<()> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&StoredEvent) -> CoreResult<()> + Send + Sync,
{
    async fn handle(&self, event: &StoredEvent) -> CoreResult<()> {
        (self.handler)(event)
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

/// Synchronous publish/subscribe keyed by event kind
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event kind
    pub async fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event_type = event_type.into();

        debug!(event_type = %event_type, subscription = id.0, "Subscribed handler");

        self.subscribers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    /// Remove a subscription by id; returns whether it was found
    pub async fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        self.remove_where(event_type, |s| s.id == id).await
    }

    /// Remove every subscription of this exact handler instance
    pub async fn unsubscribe_handler(
        &self,
        event_type: &str,
        handler: &Arc<dyn EventHandler>,
    ) -> bool {
        self.remove_where(event_type, |s| Arc::ptr_eq(&s.handler, handler))
            .await
    }

    async fn remove_where<P>(&self, event_type: &str, predicate: P) -> bool
    where
        P: Fn(&Subscription) -> bool,
    {
        let mut subscribers = self.subscribers.write().await;
        let Some(list) = subscribers.get_mut(event_type) else {
            return false;
        };

        let before = list.len();
        list.retain(|s| !predicate(s));
        let removed = list.len() != before;

        if list.is_empty() {
            subscribers.remove(event_type);
        }
        removed
    }

    /// Number of handlers subscribed to a kind
    pub async fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deliver an event to every handler of its kind, in subscription order
    pub async fn publish(&self, event: &StoredEvent) -> CoreResult<()> {
        // Snapshot so no registry lock is held while handlers run
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .subscribers
            .read()
            .await
            .get(&event.event_type)
            .map(|list| list.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        debug!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            sequence = event.sequence,
            handlers = handlers.len(),
            "Publishing event"
        );

        for (index, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.handle(event).await {
                warn!(
                    event_type = %event.event_type,
                    aggregate_id = %event.aggregate_id,
                    handler_index = index,
                    error = %e,
                    "Event handler failed; remaining handlers skipped"
                );
                return Err(e);
            }
        }

        Ok(())
    }
}
