use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    dtos::auth::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, TokenPair},
    models::{
        AuditAction, AuditEntry, DeviceInfo, NewSession, NewUser, RefreshLookup, RequestMeta,
        Role, Session, SessionInfo, User,
    },
    services::{
        error::{AuthFailure, ServiceError},
        jwt::{TokenError, TokenService, TokenType},
        Clock,
    },
    store::{
        AuditSink, CredentialStore, LockoutPolicy, SessionLedger, StoreError,
        SESSIONS_REFRESH_TOKEN_KEY, USERS_EMAIL_KEY,
    },
    utils::password::{CredentialHasher, Password, PasswordHashString},
};

/// Attempts at drawing a refresh token the ledger has not seen before.
const MAX_REFRESH_TOKEN_ATTEMPTS: u32 = 3;

/// A request that passed the auth gate.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
    pub session_id: Uuid,
}

/// Login, registration, refresh, logout and the auth gate.
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionLedger>,
    audit: Arc<dyn AuditSink>,
    tokens: TokenService,
    hasher: CredentialHasher,
    clock: Arc<dyn Clock>,
    lockout: LockoutPolicy,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionLedger>,
        audit: Arc<dyn AuditSink>,
        tokens: TokenService,
        hasher: CredentialHasher,
        clock: Arc<dyn Clock>,
        lockout: LockoutPolicy,
    ) -> Self {
        Self {
            credentials,
            sessions,
            audit,
            tokens,
            hasher,
            clock,
            lockout,
        }
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
        meta: &RequestMeta,
    ) -> Result<AuthResponse, ServiceError> {
        let now = self.clock.now();

        let password_hash = self.hasher.hash(Password::new(req.password)).await?;

        let user = User::new(
            NewUser {
                email: req.email,
                password_hash: password_hash.into_string(),
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
                phone: req.phone,
                role: Role::Client,
            },
            now,
        );

        match self.credentials.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(constraint)) if constraint == USERS_EMAIL_KEY => {
                return Err(ServiceError::EmailInUse);
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.user_id, "User registered");

        self.record(AuditEntry::new(
            Some(user.user_id),
            AuditAction::UserRegistered,
            Some(user.user_id),
            meta,
            now,
        ));

        self.open_session(&user, false, req.device_name, meta, now)
            .await
    }

    /// Credential check order: existence, password, lockout, status.
    /// Lockout and status are only revealed once the password matched.
    pub async fn login(
        &self,
        req: LoginRequest,
        meta: &RequestMeta,
    ) -> Result<AuthResponse, ServiceError> {
        let now = self.clock.now();
        let password = Password::new(req.password);

        let Some(user) = self.credentials.find_by_email(&req.email).await? else {
            self.hasher.verify_dummy(password).await?;
            tracing::warn!(ip = ?meta.ip_address, "Login failed: unknown email");
            self.record(AuditEntry::new(None, AuditAction::LoginFailed, None, meta, now));
            return Err(ServiceError::InvalidCredentials);
        };

        let matches = self
            .hasher
            .verify(password, PasswordHashString::new(user.password_hash.clone()))
            .await?;

        if !matches {
            let outcome = self
                .credentials
                .record_login_failure(user.user_id, &self.lockout, now)
                .await?;

            tracing::warn!(
                user_id = %user.user_id,
                failed_attempts = outcome.attempts,
                "Login failed: wrong password"
            );
            self.record(AuditEntry::new(
                Some(user.user_id),
                AuditAction::LoginFailed,
                Some(user.user_id),
                meta,
                now,
            ));

            if outcome.lock_armed {
                tracing::warn!(
                    user_id = %user.user_id,
                    locked_until = ?outcome.locked_until,
                    "Account locked after repeated failures"
                );
                self.record(AuditEntry::new(
                    Some(user.user_id),
                    AuditAction::AccountLocked,
                    Some(user.user_id),
                    meta,
                    now,
                ));
            }

            return Err(ServiceError::InvalidCredentials);
        }

        if let Some(until) = user.locked_until.filter(|until| *until > now) {
            tracing::warn!(user_id = %user.user_id, "Login refused: account locked");
            return Err(ServiceError::AccountLocked {
                until,
                retry_after_seconds: retry_after(until, now),
            });
        }

        if !user.is_active() {
            tracing::warn!(user_id = %user.user_id, status = %user.status, "Login refused: account not active");
            return Err(ServiceError::AccountInactive);
        }

        self.credentials
            .record_login_success(user.user_id, now)
            .await?;

        let response = self
            .open_session(&user, req.remember_me, req.device_name, meta, now)
            .await?;

        tracing::info!(user_id = %user.user_id, session_id = %response.session.id, "User logged in");
        self.record(AuditEntry::new(
            Some(user.user_id),
            AuditAction::LoginSucceeded,
            Some(response.session.id),
            meta,
            now,
        ));

        Ok(response)
    }

    /// Issue a new access token for the session bound to this refresh token.
    /// The refresh token itself is returned unchanged.
    pub async fn refresh(
        &self,
        req: RefreshRequest,
        meta: &RequestMeta,
    ) -> Result<AuthResponse, ServiceError> {
        let now = self.clock.now();

        let claims = match self.tokens.verify(&req.refresh_token, TokenType::Refresh, now) {
            Ok(claims) => Some(claims),
            // Genuine but past expiry: let the ledger retire the session.
            Err(TokenError::Expired) => None,
            Err(reason) => {
                tracing::warn!(reason = ?reason, "Refresh rejected: token did not verify");
                return Err(ServiceError::InvalidRefreshToken);
            }
        };

        let session = match self
            .sessions
            .find_active_by_refresh_token(&req.refresh_token, now)
            .await?
        {
            RefreshLookup::Active(session) => session,
            RefreshLookup::Expired => {
                tracing::info!("Refresh rejected: session expired");
                return Err(ServiceError::SessionExpired);
            }
            RefreshLookup::NotFound => {
                tracing::warn!("Refresh rejected: no active session");
                return Err(ServiceError::SessionNotFound);
            }
        };

        let Some(claims) = claims else {
            // Token exp is truncated to the second and can lapse just before the row.
            self.sessions.deactivate(session.session_id).await?;
            return Err(ServiceError::SessionExpired);
        };

        if claims.sub != session.user_id {
            tracing::error!(session_id = %session.session_id, "Refresh token subject does not match session owner");
            return Err(ServiceError::InvalidRefreshToken);
        }

        let user = self
            .credentials
            .find_by_id(session.user_id)
            .await?
            .ok_or(ServiceError::SessionNotFound)?;

        if !user.is_active() {
            tracing::warn!(user_id = %user.user_id, "Refresh refused: account not active");
            return Err(ServiceError::AccountInactive);
        }

        let lifetimes = self.tokens.lifetimes(session.remember_me);
        let access = self
            .tokens
            .issue_access_token(user.user_id, user.role, lifetimes.access, now)?;

        self.sessions
            .rotate_access_token(session.session_id, &access.token, now)
            .await?;

        tracing::info!(user_id = %user.user_id, session_id = %session.session_id, "Access token refreshed");
        self.record(AuditEntry::new(
            Some(user.user_id),
            AuditAction::TokenRefreshed,
            Some(session.session_id),
            meta,
            now,
        ));

        Ok(AuthResponse {
            user: user.sanitized(),
            tokens: TokenPair {
                access_token: access.token,
                refresh_token: req.refresh_token,
                expires_in: lifetimes.access.num_seconds(),
            },
            session: SessionInfo::from(&session),
        })
    }

    /// Deactivate the session bound to `access_token`. A token whose session
    /// is already gone succeeds quietly.
    pub async fn logout(&self, access_token: &str, meta: &RequestMeta) -> Result<(), ServiceError> {
        let now = self.clock.now();
        let claims = self
            .tokens
            .verify(access_token, TokenType::Access, now)
            .map_err(|e| reject(failure_for(e)))?;

        if let Some(session) = self
            .sessions
            .find_active_by_access_token(claims.sub, access_token, now)
            .await?
        {
            self.sessions.deactivate(session.session_id).await?;
            tracing::info!(user_id = %claims.sub, session_id = %session.session_id, "Session logged out");
            self.record(AuditEntry::new(
                Some(claims.sub),
                AuditAction::Logout,
                Some(session.session_id),
                meta,
                now,
            ));
        }

        Ok(())
    }

    pub async fn logout_all(&self, user: &User, meta: &RequestMeta) -> Result<u64, ServiceError> {
        let now = self.clock.now();
        let revoked = self.sessions.deactivate_all_for_user(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, sessions_revoked = revoked, "All sessions logged out");
        self.record(AuditEntry::new(
            Some(user.user_id),
            AuditAction::LogoutAll,
            Some(user.user_id),
            meta,
            now,
        ));

        Ok(revoked)
    }

    /// Resolve a bearer token to a user: the token must verify, its session
    /// must still be live, and the account must be active and unlocked.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Principal, ServiceError> {
        let token = bearer.ok_or_else(|| reject(AuthFailure::MissingToken))?;
        let now = self.clock.now();

        let claims = self
            .tokens
            .verify(token, TokenType::Access, now)
            .map_err(|e| reject(failure_for(e)))?;

        let session = self
            .sessions
            .find_active_by_access_token(claims.sub, token, now)
            .await?
            .ok_or_else(|| reject(AuthFailure::SessionRevoked))?;

        let user = self
            .credentials
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| reject(AuthFailure::UnknownUser))?;

        if !user.is_active() {
            return Err(reject(AuthFailure::AccountInactive));
        }
        if user.is_locked(now) {
            return Err(reject(AuthFailure::AccountLocked));
        }

        Ok(Principal {
            user,
            session_id: session.session_id,
        })
    }

    async fn open_session(
        &self,
        user: &User,
        remember_me: bool,
        device_name: Option<String>,
        meta: &RequestMeta,
        now: DateTime<Utc>,
    ) -> Result<AuthResponse, ServiceError> {
        let lifetimes = self.tokens.lifetimes(remember_me);
        let access = self
            .tokens
            .issue_access_token(user.user_id, user.role, lifetimes.access, now)?;

        for attempt in 1..=MAX_REFRESH_TOKEN_ATTEMPTS {
            let refresh = self
                .tokens
                .issue_refresh_token(user.user_id, lifetimes.refresh, now)?;

            let new_session = NewSession {
                user_id: user.user_id,
                access_token: access.token.clone(),
                refresh_token: refresh.token.clone(),
                remember_me,
                expires_utc: refresh.expires_at,
                device_info: DeviceInfo {
                    user_agent: meta.user_agent.clone(),
                    device_name: device_name.clone(),
                },
                ip_address: meta.ip_address.clone(),
            };

            match self.sessions.create(new_session, now).await {
                Ok(session) => {
                    return Ok(session_response(
                        user,
                        access.token,
                        refresh.token,
                        lifetimes.access.num_seconds(),
                        &session,
                    ));
                }
                Err(StoreError::Duplicate(constraint))
                    if constraint == SESSIONS_REFRESH_TOKEN_KEY =>
                {
                    tracing::error!(attempt, user_id = %user.user_id, "Refresh token collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "Could not issue a unique refresh token after {} attempts",
            MAX_REFRESH_TOKEN_ATTEMPTS
        )))
    }

    /// Fire-and-forget audit write.
    fn record(&self, entry: AuditEntry) {
        let sink = self.audit.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.append(&entry).await {
                tracing::error!(error = %e, action = entry.action.as_str(), "Failed to write audit entry");
            }
        });
    }
}

fn session_response(
    user: &User,
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    session: &Session,
) -> AuthResponse {
    AuthResponse {
        user: user.sanitized(),
        tokens: TokenPair {
            access_token,
            refresh_token,
            expires_in,
        },
        session: SessionInfo::from(session),
    }
}

fn failure_for(err: TokenError) -> AuthFailure {
    match err {
        TokenError::InvalidSignature => AuthFailure::BadSignature,
        TokenError::Expired => AuthFailure::Expired,
        TokenError::WrongType => AuthFailure::WrongType,
        TokenError::Malformed => AuthFailure::Malformed,
    }
}

fn reject(reason: AuthFailure) -> ServiceError {
    tracing::info!(reason = ?reason, "Request rejected by auth gate");
    ServiceError::Unauthenticated(reason)
}

fn retry_after(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((until - now).num_seconds()).unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn retry_after_is_never_zero() {
        let now = Utc::now();
        assert_eq!(retry_after(now + Duration::minutes(15), now), 900);
        assert_eq!(retry_after(now + Duration::milliseconds(200), now), 1);
        assert_eq!(retry_after(now - Duration::seconds(5), now), 1);
    }

    #[test]
    fn token_errors_map_to_gate_reasons() {
        assert_eq!(failure_for(TokenError::InvalidSignature), AuthFailure::BadSignature);
        assert_eq!(failure_for(TokenError::Expired), AuthFailure::Expired);
        assert_eq!(failure_for(TokenError::WrongType), AuthFailure::WrongType);
        assert_eq!(failure_for(TokenError::Malformed), AuthFailure::Malformed);
    }
}
