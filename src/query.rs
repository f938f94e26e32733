// Copyright (c) 2025 - Cowboy AI, Inc.
//! Queries
//!
//! Queries read from externally maintained projections. They never take the
//! aggregate lock and never touch the event log.

use async_trait::async_trait;

use crate::errors::CoreResult;
use crate::identity::MessageMetadata;

/// A read request with a declared result type
pub trait Query: Send + Sync + 'static {
    /// Declared result type
    type Output: Send + 'static;

    /// Identity and creation time
    fn metadata(&self) -> &MessageMetadata;

    /// Human-readable query name
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Handler for one query type
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    async fn handle(&self, query: Q) -> CoreResult<Q::Output>;
}
