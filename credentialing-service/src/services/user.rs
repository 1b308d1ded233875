use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::{AuditAction, AuditEntry, RequestMeta, User, UserResponse},
    services::{
        error::ServiceError,
        rbac::{self, Action},
        Clock,
    },
    store::{AuditSink, CredentialStore, SessionLedger},
};

#[derive(Clone)]
pub struct UserService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionLedger>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionLedger>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            audit,
            clock,
        }
    }

    pub fn profile(&self, actor: &User) -> Result<UserResponse, ServiceError> {
        rbac::ensure_permitted(actor, Action::ViewOwnProfile)?;
        Ok(actor.sanitized())
    }

    /// Soft-deactivate `target_user_id` and revoke every session it holds.
    pub async fn deactivate(
        &self,
        actor: &User,
        target_user_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<UserResponse, ServiceError> {
        rbac::ensure_permitted(actor, Action::DeactivateUser)?;
        rbac::ensure_not_self(actor, target_user_id)?;

        let now = self.clock.now();
        if !self.credentials.deactivate(target_user_id, now).await? {
            return Err(ServiceError::NotFound("User"));
        }
        let revoked = self.sessions.deactivate_all_for_user(target_user_id).await?;

        tracing::info!(
            actor_id = %actor.user_id,
            user_id = %target_user_id,
            sessions_revoked = revoked,
            "User deactivated"
        );

        let target = self
            .credentials
            .find_by_id(target_user_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        let entry = AuditEntry::new(
            Some(actor.user_id),
            AuditAction::UserDeactivated,
            Some(target_user_id),
            meta,
            now,
        )
        .with_snapshots(
            None,
            Some(serde_json::json!({ "status": target.status, "sessionsRevoked": revoked })),
        );
        self.audit.append(&entry).await?;

        Ok(target.sanitized())
    }
}
