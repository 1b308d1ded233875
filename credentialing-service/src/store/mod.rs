//! Persistence interfaces for the portal core.
//!
//! Every component receives its store as an injected trait object, so the
//! services run unchanged against PostgreSQL ([`PgStore`]) or the in-memory
//! double ([`InMemoryStore`]) used by tests.
//!
//! All methods that compare against "now" take it as an argument: expiry and
//! lockout decisions are made with the caller's injected clock, never with a
//! client-supplied timestamp.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Application, ApplicationStatus, AuditEntry, NewSession, RefreshLookup, Session, User,
};

/// Unique constraint names surfaced through [`StoreError::Duplicate`].
pub const USERS_EMAIL_KEY: &str = "users_email_key";
pub const SESSIONS_REFRESH_TOKEN_KEY: &str = "sessions_refresh_token_hash_key";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Duplicate(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("store error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Failed-login policy applied atomically by [`CredentialStore::record_login_failure`].
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

/// Counter state after a failed login was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// This failure reached the threshold and (re)armed the lockout.
    pub lock_armed: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new user. A taken email yields `Duplicate(USERS_EMAIL_KEY)`.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Atomically increment the failed counter and arm the lockout once the
    /// counter reaches the policy threshold. Concurrent calls never lose an
    /// increment.
    async fn record_login_failure(
        &self,
        user_id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, StoreError>;

    /// Reset the counter, clear the lockout and stamp last login/activity.
    async fn record_login_success(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Soft-deactivate. Returns false when the user does not exist.
    async fn deactivate(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Persist a new session. A refresh token that is already recorded
    /// yields `Duplicate(SESSIONS_REFRESH_TOKEN_KEY)`.
    async fn create(&self, new: NewSession, now: DateTime<Utc>) -> Result<Session, StoreError>;

    /// Resolve a refresh token. An expired session is deactivated on the way
    /// out and reported as [`RefreshLookup::Expired`], also on later retries.
    /// Expiry is checked before the active flag, so a logged-out session
    /// past its expiry also reports `Expired`.
    async fn find_active_by_refresh_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshLookup, StoreError>;

    /// Active, unexpired session of `user_id` bound to this access token.
    async fn find_active_by_access_token(
        &self,
        user_id: Uuid,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    async fn rotate_access_token(
        &self,
        session_id: Uuid,
        new_access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn deactivate(&self, session_id: Uuid) -> Result<(), StoreError>;

    /// Returns the number of sessions that were still active.
    async fn deactivate_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn insert(&self, application: &Application) -> Result<(), StoreError>;

    async fn find_by_id(&self, application_id: Uuid) -> Result<Option<Application>, StoreError>;

    /// Set `target` only if the row still holds `expected`, writing `audit`
    /// in the same unit of work. `None` means the row moved on (or vanished)
    /// since it was read.
    async fn update_status(
        &self,
        application_id: Uuid,
        expected: ApplicationStatus,
        target: ApplicationStatus,
        now: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> Result<Option<Application>, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// The injected store handles, one per concern.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionLedger>,
    pub applications: Arc<dyn ApplicationStore>,
    pub audit: Arc<dyn AuditSink>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            credentials: store.clone(),
            sessions: store.clone(),
            applications: store.clone(),
            audit: store.clone(),
            health: store,
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            credentials: store.clone(),
            sessions: store.clone(),
            applications: store.clone(),
            audit: store.clone(),
            health: store,
        }
    }
}
