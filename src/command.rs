// Copyright (c) 2025 - Cowboy AI, Inc.
//! Commands
//!
//! Commands express intent (what should happen) and can be rejected.
//! A command is built once, never mutated, and consumed by value by exactly
//! one handler. Identity and creation time come from [`MessageMetadata`],
//! stamped by injected providers rather than the wall clock.

use async_trait::async_trait;

use crate::errors::CoreResult;
use crate::identity::MessageMetadata;

/// A request to change one aggregate
pub trait Command: Send + Sync + 'static {
    /// What a successful handler returns
    type Output: Send + 'static;

    /// Identity and creation time
    fn metadata(&self) -> &MessageMetadata;

    /// Identity of the aggregate this command targets
    fn aggregate_id(&self) -> &str;
}

/// Handler for one command type
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: C) -> CoreResult<C::Output>;
}
