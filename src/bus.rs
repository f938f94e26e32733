// Copyright (c) 2025 - Cowboy AI, Inc.
//! Command and Query Buses
//!
//! Both buses are routing tables from a message's concrete type to exactly
//! one handler. They share [`HandlerRegistry`].
//!
//! # Lifecycle
//!
//! A bus is a single shared structure (wrap it in an `Arc`), populated with
//! `register` at startup and read-only in steady state. Dispatch only takes
//! the registry's read lock, and only long enough to clone the handler out,
//! so concurrent dispatches never wait on each other. Registering while
//! dispatches run is still safe.
//!
//! # Policies
//!
//! - Registering a second handler for the same type fails with
//!   `DuplicateHandler`; the first registration stays in place
//! - Dispatching a type with no handler fails with `UnregisteredHandler`
//! - Handler errors reach the caller unchanged

use std::any::{type_name, Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandHandler};
use crate::errors::{CoreError, CoreResult};
use crate::query::{Query, QueryHandler};

/// Type-keyed handler table
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler for message type `M`, rejecting duplicates
    pub async fn insert<M: 'static, H: Any + Send + Sync>(&self, handler: H) -> CoreResult<()> {
        let message_type = type_name::<M>();
        match self.handlers.write().await.entry(TypeId::of::<M>()) {
            Entry::Occupied(_) => {
                warn!(message_type, "Rejected duplicate handler registration");
                Err(CoreError::DuplicateHandler { message_type })
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(handler));
                info!(message_type, "Registered handler");
                Ok(())
            }
        }
    }

    /// Clone out the handler registered for message type `M`
    pub async fn get<M: 'static, H: Any + Clone>(&self) -> CoreResult<H> {
        let message_type = type_name::<M>();
        self.handlers
            .read()
            .await
            .get(&TypeId::of::<M>())
            .and_then(|entry| entry.downcast_ref::<H>())
            .cloned()
            .ok_or(CoreError::UnregisteredHandler { message_type })
    }

    pub async fn contains<M: 'static>(&self) -> bool {
        self.handlers.read().await.contains_key(&TypeId::of::<M>())
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }
}

/// Routes each command to its single handler
#[derive(Default)]
pub struct CommandBus {
    registry: HandlerRegistry,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for command type `C`
    pub async fn register<C, H>(&self, handler: H) -> CoreResult<()>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.register_arc::<C>(Arc::new(handler)).await
    }

    /// Register a shared handler for command type `C`
    pub async fn register_arc<C: Command>(
        &self,
        handler: Arc<dyn CommandHandler<C>>,
    ) -> CoreResult<()> {
        self.registry.insert::<C, _>(handler).await
    }

    /// Route a command to its handler and return the handler's result
    pub async fn dispatch<C: Command>(&self, command: C) -> CoreResult<C::Output> {
        let handler = self
            .registry
            .get::<C, Arc<dyn CommandHandler<C>>>()
            .await?;

        debug!(
            message_type = type_name::<C>(),
            message_id = %command.metadata().message_id,
            aggregate_id = %command.aggregate_id(),
            "Dispatching command"
        );

        handler.handle(command).await
    }

    pub async fn is_registered<C: Command>(&self) -> bool {
        self.registry.contains::<C>().await
    }

    /// Number of registered command types
    pub async fn len(&self) -> usize {
        self.registry.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.is_empty().await
    }
}

/// Routes each query to its single handler
#[derive(Default)]
pub struct QueryBus {
    registry: HandlerRegistry,
}

impl QueryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for query type `Q`
    pub async fn register<Q, H>(&self, handler: H) -> CoreResult<()>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        self.register_arc::<Q>(Arc::new(handler)).await
    }

    /// Register a shared handler for query type `Q`
    pub async fn register_arc<Q: Query>(&self, handler: Arc<dyn QueryHandler<Q>>) -> CoreResult<()> {
        self.registry.insert::<Q, _>(handler).await
    }

    /// Route a query to its handler and return the handler's result
    pub async fn dispatch<Q: Query>(&self, query: Q) -> CoreResult<Q::Output> {
        let handler = self.registry.get::<Q, Arc<dyn QueryHandler<Q>>>().await?;

        debug!(
            query = query.name(),
            message_id = %query.metadata().message_id,
            "Dispatching query"
        );

        handler.handle(query).await
    }

    pub async fn is_registered<Q: Query>(&self) -> bool {
        self.registry.contains::<Q>().await
    }

    /// Number of registered query types
    pub async fn len(&self) -> usize {
        self.registry.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.is_empty().await
    }
}
