// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-aggregate
//!
//! A small user-account domain wired through every layer: a `User` aggregate,
//! commands with lock-guarded handlers, a directory read model fed by the
//! event bus and a query over it.
//!
//! All identities and timestamps come from `SequentialIdGenerator` and
//! `FixedClock`, so runs are reproducible.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cim_aggregate::{
    Aggregate, AggregateExecutor, Command, CommandBus, CommandHandler, CoreError, CoreResult,
    DomainEvent, EventBus, EventHandler, FixedClock, InMemoryEventStore, InMemoryLockBackend,
    LockManager, MessageMetadata, Query, QueryBus, QueryHandler, Repository,
    SequentialIdGenerator, StoredEvent,
};

pub const USER_ID_1: &str = "user-1";
pub const USER_ID_2: &str = "user-2";

// Fixed test timestamp (2026-01-19T12:00:00Z)
pub const FIXED_TIMESTAMP: &str = "2026-01-19T12:00:00Z";

pub const LOCK_TTL: Duration = Duration::from_secs(30);

/// Parse the fixed timestamp
pub fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(FIXED_TIMESTAMP)
        .expect("Invalid timestamp in test fixture")
        .with_timezone(&Utc)
}

// ============================================================================
// User aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserEvent {
    UserRegistered { email: String, name: String },
    EmailChanged { email: String },
    UserDeactivated,
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered { .. } => "UserRegistered",
            UserEvent::EmailChanged { .. } => "EmailChanged",
            UserEvent::UserDeactivated => "UserDeactivated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub active: bool,
}

impl User {
    pub fn is_registered(&self) -> bool {
        self.email.is_some()
    }
}

impl Aggregate for User {
    const AGGREGATE_TYPE: &'static str = "user";
    type Event = UserEvent;

    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn apply(&mut self, event: &UserEvent) {
        match event {
            UserEvent::UserRegistered { email, name } => {
                self.email = Some(email.clone());
                self.name = Some(name.clone());
                self.active = true;
            }
            UserEvent::EmailChanged { email } => self.email = Some(email.clone()),
            UserEvent::UserDeactivated => self.active = false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user {0} is already registered")]
    AlreadyRegistered(String),

    #[error("user {0} is not registered")]
    NotRegistered(String),

    #[error("user {0} is deactivated")]
    Deactivated(String),
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub metadata: MessageMetadata,
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl Command for RegisterUser {
    type Output = u64;

    fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    fn aggregate_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug, Clone)]
pub struct ChangeEmail {
    pub metadata: MessageMetadata,
    pub user_id: String,
    pub email: String,
}

impl Command for ChangeEmail {
    type Output = u64;

    fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    fn aggregate_id(&self) -> &str {
        &self.user_id
    }
}

/// Never registered on any bus
#[derive(Debug, Clone)]
pub struct DeactivateUser {
    pub metadata: MessageMetadata,
    pub user_id: String,
}

impl Command for DeactivateUser {
    type Output = u64;

    fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    fn aggregate_id(&self) -> &str {
        &self.user_id
    }
}

pub struct RegisterUserHandler {
    executor: AggregateExecutor,
}

#[async_trait]
impl CommandHandler<RegisterUser> for RegisterUserHandler {
    async fn handle(&self, command: RegisterUser) -> CoreResult<u64> {
        let RegisterUser {
            user_id,
            email,
            name,
            ..
        } = command;

        let executed = self
            .executor
            .execute::<User, _, _>(&user_id, LOCK_TTL, |root| {
                if root.state().is_registered() {
                    return Err(CoreError::handler(UserError::AlreadyRegistered(
                        root.id().to_string(),
                    )));
                }
                root.record(UserEvent::UserRegistered { email, name });
                Ok(())
            })
            .await?;

        Ok(executed.version)
    }
}

pub struct ChangeEmailHandler {
    executor: AggregateExecutor,
}

#[async_trait]
impl CommandHandler<ChangeEmail> for ChangeEmailHandler {
    async fn handle(&self, command: ChangeEmail) -> CoreResult<u64> {
        let ChangeEmail { user_id, email, .. } = command;

        let executed = self
            .executor
            .execute::<User, _, _>(&user_id, LOCK_TTL, |root| {
                let user = root.state();
                if !user.is_registered() {
                    return Err(CoreError::handler(UserError::NotRegistered(
                        root.id().to_string(),
                    )));
                }
                if !user.active {
                    return Err(CoreError::handler(UserError::Deactivated(
                        root.id().to_string(),
                    )));
                }
                root.record(UserEvent::EmailChanged { email });
                Ok(())
            })
            .await?;

        Ok(executed.version)
    }
}

// ============================================================================
// Read model and query
// ============================================================================

/// Email directory kept current by the event bus
#[derive(Default)]
pub struct UserDirectory {
    emails: Mutex<HashMap<String, String>>,
}

impl UserDirectory {
    pub fn email_of(&self, user_id: &str) -> Option<String> {
        self.emails.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl EventHandler for UserDirectory {
    async fn handle(&self, event: &StoredEvent) -> CoreResult<()> {
        match event.decode::<UserEvent>()? {
            UserEvent::UserRegistered { email, .. } | UserEvent::EmailChanged { email } => {
                self.emails
                    .lock()
                    .unwrap()
                    .insert(event.aggregate_id.clone(), email);
            }
            UserEvent::UserDeactivated => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetUserEmail {
    pub metadata: MessageMetadata,
    pub user_id: String,
}

impl Query for GetUserEmail {
    type Output = Option<String>;

    fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }
}

pub struct GetUserEmailHandler {
    directory: Arc<UserDirectory>,
}

impl GetUserEmailHandler {
    pub fn new(directory: Arc<UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl QueryHandler<GetUserEmail> for GetUserEmailHandler {
    async fn handle(&self, query: GetUserEmail) -> CoreResult<Option<String>> {
        Ok(self.directory.email_of(&query.user_id))
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Everything a test needs, wired the way an application would
pub struct Harness {
    pub commands: Arc<CommandBus>,
    pub queries: Arc<QueryBus>,
    pub events: Arc<EventBus>,
    pub store: Arc<InMemoryEventStore>,
    pub lock_backend: Arc<InMemoryLockBackend>,
    pub repository: Repository,
    pub executor: AggregateExecutor,
    pub directory: Arc<UserDirectory>,
    pub ids: Arc<SequentialIdGenerator>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub async fn new() -> Self {
        let ids = Arc::new(SequentialIdGenerator::new());
        let clock = Arc::new(FixedClock::new(fixed_timestamp()));
        let store = Arc::new(InMemoryEventStore::new());
        let events = Arc::new(EventBus::new());
        let lock_backend = Arc::new(InMemoryLockBackend::new());

        let repository = Repository::new(store.clone())
            .with_event_bus(events.clone())
            .with_id_generator(ids.clone())
            .with_clock(clock.clone());
        let executor = AggregateExecutor::new(
            repository.clone(),
            LockManager::new(lock_backend.clone()),
            LOCK_TTL,
        );

        let directory = Arc::new(UserDirectory::default());
        for kind in ["UserRegistered", "EmailChanged"] {
            events.subscribe(kind, directory.clone()).await;
        }

        let commands = Arc::new(CommandBus::new());
        commands
            .register::<RegisterUser, _>(RegisterUserHandler {
                executor: executor.clone(),
            })
            .await
            .expect("register RegisterUser");
        commands
            .register::<ChangeEmail, _>(ChangeEmailHandler {
                executor: executor.clone(),
            })
            .await
            .expect("register ChangeEmail");

        let queries = Arc::new(QueryBus::new());
        queries
            .register::<GetUserEmail, _>(GetUserEmailHandler::new(directory.clone()))
            .await
            .expect("register GetUserEmail");

        Self {
            commands,
            queries,
            events,
            store,
            lock_backend,
            repository,
            executor,
            directory,
            ids,
            clock,
        }
    }

    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata::new(self.ids.as_ref(), self.clock.as_ref())
    }

    pub fn register_user(&self, user_id: &str, email: &str) -> RegisterUser {
        RegisterUser {
            metadata: self.metadata(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            name: "Test User".to_string(),
        }
    }

    pub fn change_email(&self, user_id: &str, email: &str) -> ChangeEmail {
        ChangeEmail {
            metadata: self.metadata(),
            user_id: user_id.to_string(),
            email: email.to_string(),
        }
    }

    pub fn get_user_email(&self, user_id: &str) -> GetUserEmail {
        GetUserEmail {
            metadata: self.metadata(),
            user_id: user_id.to_string(),
        }
    }
}
