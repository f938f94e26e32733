// Copyright (c) 2025 - Cowboy AI, Inc.
//! Locked aggregate execution
//!
//! The sequence every state-changing command handler follows:
//!
//! ```text
//! lock(type, id) ──▶ load ──▶ operation(&mut root) ──▶ save ──▶ release
//! ```
//!
//! The lock is released on every path, including a failed operation, a
//! version conflict on save and a panic inside the operation.

use std::time::Duration;

use tracing::debug;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::errors::CoreResult;
use crate::lock::{LockKey, LockManager};
use crate::repository::Repository;

/// Outcome of a locked execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed<R> {
    /// Value returned by the operation
    pub output: R,
    /// Events persisted by the save
    pub persisted: usize,
    /// Aggregate version after the save
    pub version: u64,
}

/// Runs operations against aggregates under their lock
#[derive(Clone)]
pub struct AggregateExecutor {
    repository: Repository,
    locks: LockManager,
    default_ttl: Duration,
}

impl AggregateExecutor {
    pub fn new(repository: Repository, locks: LockManager, default_ttl: Duration) -> Self {
        Self {
            repository,
            locks,
            default_ttl,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Lock, load, mutate and save one aggregate
    ///
    /// `operation` records events on the root; an `Err` from it skips the
    /// save. Fails fast with `LockAcquisitionFailure` if the aggregate is
    /// locked elsewhere.
    pub async fn execute<A, F, R>(
        &self,
        aggregate_id: &str,
        ttl: Duration,
        operation: F,
    ) -> CoreResult<Executed<R>>
    where
        A: Aggregate,
        F: FnOnce(&mut AggregateRoot<A>) -> CoreResult<R> + Send,
        R: Send,
    {
        let key = LockKey::aggregate(A::AGGREGATE_TYPE, aggregate_id);

        self.locks
            .execute_locked(&key, ttl, || async move {
                let mut root = self.repository.load::<A>(aggregate_id).await?;
                let output = operation(&mut root)?;
                let persisted = self.repository.save(&mut root).await?;

                debug!(
                    aggregate_type = A::AGGREGATE_TYPE,
                    aggregate_id,
                    persisted,
                    version = root.version(),
                    "Executed operation"
                );

                Ok(Executed {
                    output,
                    persisted,
                    version: root.version(),
                })
            })
            .await
    }

    /// [`execute`](Self::execute) with the configured lease
    pub async fn execute_default<A, F, R>(
        &self,
        aggregate_id: &str,
        operation: F,
    ) -> CoreResult<Executed<R>>
    where
        A: Aggregate,
        F: FnOnce(&mut AggregateRoot<A>) -> CoreResult<R> + Send,
        R: Send,
    {
        self.execute(aggregate_id, self.default_ttl, operation).await
    }
}
