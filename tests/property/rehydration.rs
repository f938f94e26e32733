// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Rehydration
//!
//! For any sequence of user events:
//! - saving then loading reproduces state and version
//! - loading then saving with nothing recorded changes nothing
//! - replaying a history equals recording it event by event
//! - how the events were batched into saves does not matter

use std::sync::Arc;

use proptest::prelude::*;

use cim_aggregate::{AggregateRoot, EventStore, InMemoryEventStore, Repository};

use crate::fixtures::{User, UserEvent, USER_ID_1};

// ============================================================================
// Strategies
// ============================================================================

fn email_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}@[a-z]{1,8}\\.(dev|org|com)"
}

fn user_event_strategy() -> impl Strategy<Value = UserEvent> {
    prop_oneof![
        (email_strategy(), "[A-Z][a-z]{0,10}")
            .prop_map(|(email, name)| UserEvent::UserRegistered { email, name }),
        email_strategy().prop_map(|email| UserEvent::EmailChanged { email }),
        Just(UserEvent::UserDeactivated),
    ]
}

fn history_strategy() -> impl Strategy<Value = Vec<UserEvent>> {
    prop::collection::vec(user_event_strategy(), 0..24)
}

fn repository() -> (Repository, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    (Repository::new(store.clone()), store)
}

fn record_all(events: &[UserEvent]) -> AggregateRoot<User> {
    let mut root = AggregateRoot::<User>::new(USER_ID_1);
    for event in events {
        root.record(event.clone());
    }
    root
}

// ============================================================================
// Laws
// ============================================================================

proptest! {
    #[test]
    fn prop_save_then_load_round_trips(events in history_strategy()) {
        tokio_test::block_on(async {
            let (repo, _) = repository();
            let mut root = record_all(&events);

            let persisted = repo.save(&mut root).await.unwrap();
            prop_assert_eq!(persisted, events.len());

            let loaded = repo.load::<User>(USER_ID_1).await.unwrap();
            prop_assert_eq!(loaded.version(), events.len() as u64);
            prop_assert_eq!(loaded.state(), root.state());
            prop_assert!(!loaded.has_pending());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_load_then_empty_save_is_noop(events in history_strategy()) {
        tokio_test::block_on(async {
            let (repo, store) = repository();
            let mut root = record_all(&events);
            repo.save(&mut root).await.unwrap();

            let before = store.read("user", USER_ID_1).await.unwrap();
            let mut loaded = repo.load::<User>(USER_ID_1).await.unwrap();
            let persisted = repo.save(&mut loaded).await.unwrap();
            let after = store.read("user", USER_ID_1).await.unwrap();

            prop_assert_eq!(persisted, 0);
            prop_assert_eq!(loaded.version(), events.len() as u64);
            prop_assert_eq!(before, after);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_replay_equals_recording(events in history_strategy()) {
        let replayed = AggregateRoot::<User>::replay(USER_ID_1, &events);
        let recorded = record_all(&events);

        prop_assert_eq!(replayed.state(), recorded.state());
        prop_assert_eq!(replayed.version(), events.len() as u64);
        prop_assert_eq!(recorded.pending().len(), events.len());
    }

    #[test]
    fn prop_batching_does_not_change_outcome(
        events in history_strategy(),
        split in any::<prop::sample::Index>()
    ) {
        tokio_test::block_on(async {
            let cut = split.index(events.len() + 1);
            let (head, tail) = events.split_at(cut);

            let (repo, _) = repository();
            let mut root = repo.load::<User>(USER_ID_1).await.unwrap();
            for event in head {
                root.record(event.clone());
            }
            repo.save(&mut root).await.unwrap();
            for event in tail {
                root.record(event.clone());
            }
            repo.save(&mut root).await.unwrap();

            let loaded = repo.load::<User>(USER_ID_1).await.unwrap();
            let expected = AggregateRoot::<User>::replay(USER_ID_1, &events);
            prop_assert_eq!(loaded.state(), expected.state());
            prop_assert_eq!(loaded.version(), events.len() as u64);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
