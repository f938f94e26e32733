// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for aggregate persistence, dispatch and locking
//!
//! Every failure in this crate is a [`CoreError`] variant so callers can tell
//! failures apart by kind. Only [`CoreError::ConcurrencyConflict`] is
//! retryable, and nothing here retries it automatically.

use thiserror::Error;

/// Errors that can occur in the aggregate core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Replaying an aggregate's history failed
    #[error("failed to rehydrate {aggregate_type} '{aggregate_id}': {source}")]
    RehydrationFailure {
        aggregate_type: String,
        aggregate_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The stored version did not match the expected version
    #[error(
        "concurrency conflict on '{aggregate_id}': expected version {expected}, found {actual} (reload and retry)"
    )]
    ConcurrencyConflict {
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    /// The lock marker already exists in the backing store
    #[error("failed to acquire lock '{key}': already held")]
    LockAcquisitionFailure { key: String },

    /// No handler is registered for the dispatched message type
    #[error("no handler registered for {message_type}")]
    UnregisteredHandler { message_type: &'static str },

    /// A handler is already registered for this message type
    #[error("handler already registered for {message_type}")]
    DuplicateHandler { message_type: &'static str },

    /// A command, query or event handler failed
    #[error("handler failed: {0}")]
    HandlerFailure(#[source] anyhow::Error),

    /// Events were persisted but publishing them to subscribers failed
    #[error(
        "events for '{aggregate_id}' persisted at version {version} but publish failed: {source}"
    )]
    PublishAfterCommit {
        aggregate_id: String,
        version: u64,
        #[source]
        source: Box<CoreError>,
    },

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// Backing store error
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Wrap a domain error raised inside a handler
    pub fn handler<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CoreError::HandlerFailure(anyhow::Error::new(err))
    }

    /// Build a rehydration failure for the given aggregate
    pub fn rehydration<E>(aggregate_type: &str, aggregate_id: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CoreError::RehydrationFailure {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            source: source.into(),
        }
    }

    /// Whether the caller may reload and retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConcurrencyConflict { .. })
    }
}

impl From<async_nats::Error> for CoreError {
    fn from(err: async_nats::Error) -> Self {
        CoreError::NatsConnection(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
