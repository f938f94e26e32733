// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for aggregate rehydration and persistence
//!
//! These tests verify the repository contract:
//! 1. Load an aggregate by replaying its history
//! 2. Record events and save them under the expected version
//! 3. Reload and observe the same state

mod fixtures;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use cim_aggregate::{
    AggregateRoot, AggregateStatus, CoreError, EventMetadata, EventStore, InMemoryEventStore,
    NewEvent, Repository,
};
use fixtures::{fixed_timestamp, Harness, User, UserEvent, USER_ID_1, USER_ID_2};

fn registered() -> UserEvent {
    UserEvent::UserRegistered {
        email: "ada@example.com".to_string(),
        name: "Ada".to_string(),
    }
}

#[tokio::test]
async fn test_empty_history_loads_empty_aggregate() {
    let harness = Harness::new().await;

    let history = harness.store.read("user", USER_ID_1).await.unwrap();
    assert!(history.is_empty());

    let root = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    assert_eq!(root.version(), 0);
    assert_eq!(root.status(), AggregateStatus::Hydrated);
    assert_eq!(root.state(), &User {
        id: USER_ID_1.to_string(),
        ..Default::default()
    });
}

#[tokio::test]
async fn test_load_then_empty_save_is_noop() {
    let harness = Harness::new().await;

    let mut root = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    root.record(registered());
    harness.repository.save(&mut root).await.unwrap();

    let mut reloaded = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    let persisted = harness.repository.save(&mut reloaded).await.unwrap();

    assert_eq!(persisted, 0);
    assert_eq!(reloaded.version(), 1);
    assert_eq!(harness.store.current_version("user", USER_ID_1).await.unwrap(), 1);
}

#[tokio::test]
async fn test_save_then_load_reproduces_state() {
    let harness = Harness::new().await;

    let mut root = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    root.record(registered());
    root.record(UserEvent::EmailChanged {
        email: "ada@lovelace.dev".to_string(),
    });
    root.record(UserEvent::UserDeactivated);
    assert_eq!(root.status(), AggregateStatus::Dirty);

    assert_eq!(harness.repository.save(&mut root).await.unwrap(), 3);
    assert_eq!(root.version(), 3);
    assert_eq!(root.status(), AggregateStatus::Hydrated);

    let reloaded = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    assert_eq!(reloaded.version(), root.version());
    assert_eq!(reloaded.state(), root.state());
    assert_eq!(reloaded.state().email.as_deref(), Some("ada@lovelace.dev"));
    assert!(!reloaded.state().active);
}

#[tokio::test]
async fn test_events_carry_deterministic_identity_and_time() {
    let harness = Harness::new().await;

    let mut root = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    root.record(registered());
    harness.repository.save(&mut root).await.unwrap();

    let history = harness.repository.history("user", USER_ID_1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sequence, 1);
    assert_eq!(history[0].event_type, "UserRegistered");
    assert_eq!(history[0].occurred_at, fixed_timestamp());
    assert_eq!(history[0].event_id, uuid::Uuid::from_u64_pair(0, 1));
}

#[tokio::test]
async fn test_racing_saves_produce_exactly_one_conflict() {
    let harness = Harness::new().await;

    let mut first = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    let mut second = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    first.record(registered());
    second.record(UserEvent::UserRegistered {
        email: "grace@example.com".to_string(),
        name: "Grace".to_string(),
    });

    let repo_a = harness.repository.clone();
    let repo_b = harness.repository.clone();
    let (a, b) = tokio::join!(repo_a.save(&mut first), repo_b.save(&mut second));

    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(CoreError::ConcurrencyConflict { .. })))
        .count();
    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!((successes, conflicts), (1, 1));

    let (winner, loser) = if a.is_ok() {
        (&first, &second)
    } else {
        (&second, &first)
    };
    assert_eq!(loser.version(), 0);
    assert!(loser.has_pending());

    let history = harness.store.read("user", USER_ID_1).await.unwrap();
    assert_eq!(history.len(), 1);

    let reloaded = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    assert_eq!(reloaded.state(), winner.state());
}

#[tokio::test]
async fn test_conflict_is_retryable_after_reload() {
    let harness = Harness::new().await;

    let mut stale = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    let mut fresh = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    fresh.record(registered());
    harness.repository.save(&mut fresh).await.unwrap();

    stale.record(UserEvent::UserDeactivated);
    let err = harness.repository.save(&mut stale).await.unwrap_err();
    assert!(err.is_retryable());

    let mut retried = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    retried.record(UserEvent::UserDeactivated);
    assert_eq!(harness.repository.save(&mut retried).await.unwrap(), 1);
    assert_eq!(retried.version(), 2);
}

#[tokio::test]
async fn test_aggregates_are_isolated_by_id() {
    let harness = Harness::new().await;

    let mut one = harness.repository.load::<User>(USER_ID_1).await.unwrap();
    one.record(registered());
    harness.repository.save(&mut one).await.unwrap();

    let two = harness.repository.load::<User>(USER_ID_2).await.unwrap();
    assert_eq!(two.version(), 0);
    assert!(!two.state().is_registered());
}

#[tokio::test]
async fn test_undecodable_history_fails_rehydration() {
    let store = Arc::new(InMemoryEventStore::new());
    store
        .append(
            "user",
            USER_ID_1,
            vec![NewEvent {
                event_id: uuid::Uuid::nil(),
                event_type: "UserRegistered".to_string(),
                payload: serde_json::json!({"type": "UserRegistered", "email": 42}),
                occurred_at: fixed_timestamp(),
                metadata: EventMetadata::default(),
            }],
            0,
        )
        .await
        .unwrap();

    let repository = Repository::new(store);
    let result = repository.load::<User>(USER_ID_1).await;

    assert!(matches!(result, Err(CoreError::RehydrationFailure { .. })));
}

#[test]
fn test_replay_does_not_queue_events() {
    let history = vec![registered(), UserEvent::UserDeactivated];
    let root = AggregateRoot::<User>::replay(USER_ID_1, &history);

    assert_eq!(root.version(), 2);
    assert!(root.pending().is_empty());
    assert!(!root.state().active);
}
