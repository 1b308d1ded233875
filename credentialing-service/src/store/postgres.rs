//! PostgreSQL implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, types::Json, FromRow};
use uuid::Uuid;

use super::{
    ApplicationStore, AuditSink, CredentialStore, FailedLogin, LockoutPolicy, SessionLedger,
    StoreError, StoreHealth,
};
use crate::models::{
    hash_token, Application, ApplicationStatus, AuditEntry, DeviceInfo, NewSession,
    RefreshLookup, Session, User,
};

/// Postgres error code raised when `statement_timeout` cancels a query.
const QUERY_CANCELED: &str = "57014";
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
                StoreError::Timeout
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                StoreError::Duplicate(db.constraint().unwrap_or("unknown").to_string())
            }
            _ => StoreError::Backend(anyhow::Error::new(err)),
        }
    }
}

fn decode_error(what: &str, value: String) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("Corrupt {} column value: {}", what, value))
}

#[derive(Debug, FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role_code: String,
    account_status_code: String,
    failed_login_attempts: i32,
    locked_until_utc: Option<DateTime<Utc>>,
    last_login_utc: Option<DateTime<Utc>>,
    last_activity_utc: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            user_id: row.user_id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            role: row.role_code.parse().map_err(|_| decode_error("role_code", row.role_code))?,
            status: row
                .account_status_code
                .parse()
                .map_err(|_| decode_error("account_status_code", row.account_status_code))?,
            failed_login_attempts: row.failed_login_attempts,
            locked_until: row.locked_until_utc,
            last_login_utc: row.last_login_utc,
            last_activity_utc: row.last_activity_utc,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    access_token_hash: String,
    refresh_token_hash: String,
    remember_me: bool,
    expires_utc: DateTime<Utc>,
    is_active: bool,
    device_info: Json<DeviceInfo>,
    ip_address: Option<String>,
    last_used_utc: DateTime<Utc>,
    created_utc: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            session_id: row.session_id,
            user_id: row.user_id,
            access_token_hash: row.access_token_hash,
            refresh_token_hash: row.refresh_token_hash,
            remember_me: row.remember_me,
            expires_utc: row.expires_utc,
            is_active: row.is_active,
            device_info: row.device_info.0,
            ip_address: row.ip_address,
            last_used_utc: row.last_used_utc,
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    application_id: Uuid,
    owner_id: Uuid,
    service_type: String,
    notes: Option<String>,
    status_code: String,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
    status_changed_utc: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = StoreError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.application_id,
            owner_id: row.owner_id,
            service_type: row.service_type,
            notes: row.notes,
            status: row
                .status_code
                .parse()
                .map_err(|_| decode_error("status_code", row.status_code))?,
            created_at: row.created_utc,
            updated_at: row.updated_utc,
            status_changed_at: row.status_changed_utc,
        })
    }
}

/// PostgreSQL-backed store for users, sessions, applications and audit logs.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, first_name, last_name, phone,
                               role_code, account_status_code, failed_login_attempts,
                               locked_until_utc, last_login_utc, last_activity_utc,
                               created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login_utc)
        .bind(user.last_activity_utc)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, StoreError> {
        // Single statement: the row lock serializes concurrent increments.
        let (attempts, locked_until): (i32, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until_utc = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE locked_until_utc
                END,
                updated_utc = $4
            WHERE user_id = $1
            RETURNING failed_login_attempts, locked_until_utc
            "#,
        )
        .bind(user_id)
        .bind(policy.max_failed_attempts)
        .bind(now + policy.lockout_duration)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("User {} vanished", user_id)))?;

        Ok(FailedLogin {
            attempts,
            locked_until,
            lock_armed: attempts >= policy.max_failed_attempts,
        })
    }

    async fn record_login_success(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_until_utc = NULL,
                last_login_utc = $2,
                last_activity_utc = $2,
                updated_utc = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET account_status_code = 'inactive', updated_utc = $2 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionLedger for PgStore {
    async fn create(&self, new: NewSession, now: DateTime<Utc>) -> Result<Session, StoreError> {
        let session = Session::open(new, now);
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, access_token_hash, refresh_token_hash,
                                  remember_me, expires_utc, is_active, device_info, ip_address,
                                  last_used_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.access_token_hash)
        .bind(&session.refresh_token_hash)
        .bind(session.remember_me)
        .bind(session.expires_utc)
        .bind(session.is_active)
        .bind(Json(&session.device_info))
        .bind(&session.ip_address)
        .bind(session.last_used_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_active_by_refresh_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshLookup, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE refresh_token_hash = $1",
        )
        .bind(hash_token(refresh_token))
        .fetch_optional(&self.pool)
        .await?;

        let Some(session) = row.map(Session::from) else {
            return Ok(RefreshLookup::NotFound);
        };

        if session.is_expired(now) {
            if session.is_active {
                sqlx::query("UPDATE sessions SET is_active = FALSE WHERE session_id = $1")
                    .bind(session.session_id)
                    .execute(&self.pool)
                    .await?;
                tracing::info!(session_id = %session.session_id, "Deactivated expired session");
            }
            return Ok(RefreshLookup::Expired);
        }

        if !session.is_active {
            return Ok(RefreshLookup::NotFound);
        }

        Ok(RefreshLookup::Active(session))
    }

    async fn find_active_by_access_token(
        &self,
        user_id: Uuid,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM sessions
            WHERE user_id = $1 AND access_token_hash = $2 AND is_active AND expires_utc > $3
            "#,
        )
        .bind(user_id)
        .bind(hash_token(access_token))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn rotate_access_token(
        &self,
        session_id: Uuid,
        new_access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sessions SET access_token_hash = $2, last_used_utc = $3 WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(hash_token(new_access_token))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate(&self, session_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET is_active = FALSE WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE sessions SET is_active = FALSE WHERE user_id = $1 AND is_active")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

async fn insert_audit<'e, E>(executor: E, entry: &AuditEntry) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_logs (audit_id, actor_user_id, action_code, resource_id, before_data,
                                after_data, ip_address, user_agent, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.audit_id)
    .bind(entry.actor_user_id)
    .bind(entry.action.as_str())
    .bind(entry.resource_id)
    .bind(&entry.before)
    .bind(&entry.after)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(entry.created_utc)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn insert(&self, application: &Application) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO applications (application_id, owner_id, service_type, notes, status_code,
                                      created_utc, updated_utc, status_changed_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(application.id)
        .bind(application.owner_id)
        .bind(&application.service_type)
        .bind(&application.notes)
        .bind(application.status.as_str())
        .bind(application.created_at)
        .bind(application.updated_at)
        .bind(application.status_changed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, application_id: Uuid) -> Result<Option<Application>, StoreError> {
        sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Application::try_from)
        .transpose()
    }

    async fn update_status(
        &self,
        application_id: Uuid,
        expected: ApplicationStatus,
        target: ApplicationStatus,
        now: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> Result<Option<Application>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            UPDATE applications
            SET status_code = $3, updated_utc = $4, status_changed_utc = $4
            WHERE application_id = $1 AND status_code = $2
            RETURNING *
            "#,
        )
        .bind(application_id)
        .bind(expected.as_str())
        .bind(target.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;

        Application::try_from(row).map(Some)
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        insert_audit(&self.pool, entry).await
    }
}
