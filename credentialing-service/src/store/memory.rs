//! In-memory implementation of the store traits.
//!
//! Every operation runs under one mutex, which gives the same atomicity the
//! single-statement SQL updates give in [`super::PgStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    ApplicationStore, AuditSink, CredentialStore, FailedLogin, LockoutPolicy, SessionLedger,
    StoreError, StoreHealth, SESSIONS_REFRESH_TOKEN_KEY, USERS_EMAIL_KEY,
};
use crate::models::{
    hash_token, normalize_email, AccountStatus, Application, ApplicationStatus, AuditEntry,
    NewSession, RefreshLookup, Session, User,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    applications: HashMap<Uuid, Application>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("In-memory store mutex poisoned: {}", e)))
    }

    /// Snapshot of the audit trail, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock().map(|s| s.audit.clone()).unwrap_or_default()
    }

    pub fn session(&self, session_id: Uuid) -> Option<Session> {
        self.lock().ok()?.sessions.get(&session_id).cloned()
    }

    pub fn sessions_for_user(&self, user_id: Uuid) -> Vec<Session> {
        self.lock()
            .map(|s| {
                s.sessions
                    .values()
                    .filter(|session| session.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.lock().ok()?.users.get(&user_id).cloned()
    }

    /// Overwrite a stored user, for arranging test fixtures.
    pub fn put_user(&self, user: User) {
        if let Ok(mut state) = self.lock() {
            state.users.insert(user.user_id, user);
        }
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let email = normalize_email(&user.email);
        if state.users.values().any(|u| normalize_email(&u.email) == email) {
            return Err(StoreError::Duplicate(USERS_EMAIL_KEY.to_string()));
        }
        state.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        let state = self.lock()?;
        Ok(state
            .users
            .values()
            .find(|u| normalize_email(&u.email) == email)
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, StoreError> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("User {} vanished", user_id)))?;

        user.failed_login_attempts += 1;
        let lock_armed = user.failed_login_attempts >= policy.max_failed_attempts;
        if lock_armed {
            user.locked_until = Some(now + policy.lockout_duration);
        }
        user.updated_utc = now;

        Ok(FailedLogin {
            attempts: user.failed_login_attempts,
            locked_until: user.locked_until,
            lock_armed,
        })
    }

    async fn record_login_success(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login_utc = Some(now);
            user.last_activity_utc = Some(now);
            user.updated_utc = now;
        }
        Ok(())
    }

    async fn deactivate(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.status = AccountStatus::Inactive;
                user.updated_utc = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SessionLedger for InMemoryStore {
    async fn create(&self, new: NewSession, now: DateTime<Utc>) -> Result<Session, StoreError> {
        let session = Session::open(new, now);
        let mut state = self.lock()?;
        if state
            .sessions
            .values()
            .any(|s| s.refresh_token_hash == session.refresh_token_hash)
        {
            return Err(StoreError::Duplicate(SESSIONS_REFRESH_TOKEN_KEY.to_string()));
        }
        state.sessions.insert(session.session_id, session.clone());
        Ok(session)
    }

    async fn find_active_by_refresh_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshLookup, StoreError> {
        let digest = hash_token(refresh_token);
        let mut state = self.lock()?;
        let Some(session) = state
            .sessions
            .values_mut()
            .find(|s| s.refresh_token_hash == digest)
        else {
            return Ok(RefreshLookup::NotFound);
        };

        if session.is_expired(now) {
            session.is_active = false;
            return Ok(RefreshLookup::Expired);
        }
        if !session.is_active {
            return Ok(RefreshLookup::NotFound);
        }
        Ok(RefreshLookup::Active(session.clone()))
    }

    async fn find_active_by_access_token(
        &self,
        user_id: Uuid,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let digest = hash_token(access_token);
        let state = self.lock()?;
        Ok(state
            .sessions
            .values()
            .find(|s| s.user_id == user_id && s.access_token_hash == digest && s.is_usable(now))
            .cloned())
    }

    async fn rotate_access_token(
        &self,
        session_id: Uuid,
        new_access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.access_token_hash = hash_token(new_access_token);
            session.last_used_utc = now;
        }
        Ok(())
    }

    async fn deactivate(&self, session_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.is_active = false;
        }
        Ok(())
    }

    async fn deactivate_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let mut count = 0;
        for session in state
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            session.is_active = false;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn insert(&self, application: &Application) -> Result<(), StoreError> {
        self.lock()?
            .applications
            .insert(application.id, application.clone());
        Ok(())
    }

    async fn find_by_id(&self, application_id: Uuid) -> Result<Option<Application>, StoreError> {
        Ok(self.lock()?.applications.get(&application_id).cloned())
    }

    async fn update_status(
        &self,
        application_id: Uuid,
        expected: ApplicationStatus,
        target: ApplicationStatus,
        now: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> Result<Option<Application>, StoreError> {
        let mut state = self.lock()?;
        let updated = match state.applications.get_mut(&application_id) {
            Some(app) if app.status == expected => {
                app.status = target;
                app.updated_at = now;
                app.status_changed_at = now;
                app.clone()
            }
            _ => return Ok(None),
        };
        state.audit.push(audit.clone());
        Ok(Some(updated))
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.lock()?.audit.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceInfo, NewUser, Role};
    use chrono::Duration;
    use std::sync::Arc;

    fn user(email: &str) -> User {
        User::new(
            NewUser {
                email: email.to_string(),
                password_hash: "$argon2id$stub".to_string(),
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
                phone: None,
                role: Role::Client,
            },
            Utc::now(),
        )
    }

    fn new_session(user_id: Uuid, refresh: &str, expires: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id,
            access_token: format!("access-for-{}", refresh),
            refresh_token: refresh.to_string(),
            remember_me: false,
            expires_utc: expires,
            device_info: DeviceInfo::default(),
            ip_address: Some("127.0.0.1".to_string()),
        }
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_insensitive() {
        let store = InMemoryStore::new();
        store.insert_user(&user("nurse@clinic.org")).await.unwrap();

        let err = store.insert_user(&user("NURSE@Clinic.org")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref c) if c == USERS_EMAIL_KEY));

        let found = store.find_by_email("  Nurse@CLINIC.org").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn concurrent_failures_are_not_lost() {
        let store = Arc::new(InMemoryStore::new());
        let u = user("busy@clinic.org");
        store.insert_user(&u).await.unwrap();
        let policy = LockoutPolicy {
            max_failed_attempts: 1000,
            lockout_duration: Duration::minutes(15),
        };

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            let user_id = u.user_id;
            handles.push(tokio::spawn(async move {
                store
                    .record_login_failure(user_id, &policy, Utc::now())
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.user(u.user_id).unwrap().failed_login_attempts, 50);
    }

    #[tokio::test]
    async fn lockout_arms_at_threshold() {
        let store = InMemoryStore::new();
        let u = user("lock@clinic.org");
        store.insert_user(&u).await.unwrap();
        let now = Utc::now();
        let policy = LockoutPolicy::default();

        for attempt in 1..=4 {
            let outcome = store.record_login_failure(u.user_id, &policy, now).await.unwrap();
            assert_eq!(outcome.attempts, attempt);
            assert!(!outcome.lock_armed);
            assert_eq!(outcome.locked_until, None);
        }

        let fifth = store.record_login_failure(u.user_id, &policy, now).await.unwrap();
        assert_eq!(fifth.attempts, 5);
        assert!(fifth.lock_armed);
        assert_eq!(fifth.locked_until, Some(now + Duration::minutes(15)));

        store.record_login_success(u.user_id, now).await.unwrap();
        let reset = store.user(u.user_id).unwrap();
        assert_eq!(reset.failed_login_attempts, 0);
        assert_eq!(reset.locked_until, None);
        assert_eq!(reset.last_login_utc, Some(now));
    }

    #[tokio::test]
    async fn duplicate_refresh_token_is_rejected() {
        let store = InMemoryStore::new();
        let expires = Utc::now() + Duration::days(7);
        let user_id = Uuid::new_v4();

        store
            .create(new_session(user_id, "refresh-1", expires), Utc::now())
            .await
            .unwrap();
        let err = store
            .create(new_session(user_id, "refresh-1", expires), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Duplicate(ref c) if c == SESSIONS_REFRESH_TOKEN_KEY));
    }

    #[tokio::test]
    async fn expired_session_is_deactivated_on_lookup_and_stays_expired() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let session = store
            .create(new_session(Uuid::new_v4(), "refresh-2", now + Duration::hours(1)), now)
            .await
            .unwrap();

        let later = now + Duration::hours(2);
        let first = store.find_active_by_refresh_token("refresh-2", later).await.unwrap();
        assert!(matches!(first, RefreshLookup::Expired));
        assert!(!store.session(session.session_id).unwrap().is_active);

        let retry = store.find_active_by_refresh_token("refresh-2", later).await.unwrap();
        assert!(matches!(retry, RefreshLookup::Expired));
    }

    #[tokio::test]
    async fn revoked_session_is_not_found_by_either_token() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let session = store
            .create(new_session(user_id, "refresh-3", now + Duration::days(1)), now)
            .await
            .unwrap();

        assert!(store
            .find_active_by_access_token(user_id, "access-for-refresh-3", now)
            .await
            .unwrap()
            .is_some());

        SessionLedger::deactivate(&store, session.session_id).await.unwrap();

        assert!(store
            .find_active_by_access_token(user_id, "access-for-refresh-3", now)
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            store.find_active_by_refresh_token("refresh-3", now).await.unwrap(),
            RefreshLookup::NotFound
        ));
    }

    #[tokio::test]
    async fn expiry_is_reported_before_revocation() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let session = store
            .create(new_session(Uuid::new_v4(), "refresh-4", now + Duration::hours(1)), now)
            .await
            .unwrap();
        SessionLedger::deactivate(&store, session.session_id).await.unwrap();

        assert!(matches!(
            store.find_active_by_refresh_token("refresh-4", now).await.unwrap(),
            RefreshLookup::NotFound
        ));
        assert!(matches!(
            store
                .find_active_by_refresh_token("refresh-4", now + Duration::hours(2))
                .await
                .unwrap(),
            RefreshLookup::Expired
        ));
    }

    #[tokio::test]
    async fn conditional_status_update_detects_stale_snapshot() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let app = Application::draft(Uuid::new_v4(), "privileging".to_string(), None, now);
        store.insert(&app).await.unwrap();
        let audit = AuditEntry::new(
            None,
            crate::models::AuditAction::ApplicationStatusChanged,
            Some(app.id),
            &Default::default(),
            now,
        );

        let moved = store
            .update_status(app.id, ApplicationStatus::Draft, ApplicationStatus::Submitted, now, &audit)
            .await
            .unwrap();
        assert_eq!(moved.unwrap().status, ApplicationStatus::Submitted);

        let stale = store
            .update_status(app.id, ApplicationStatus::Draft, ApplicationStatus::Cancelled, now, &audit)
            .await
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(store.audit_entries().len(), 1);
    }
}
