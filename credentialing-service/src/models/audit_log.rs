//! Audit entry model - append-only record of security and workflow events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserRegistered,
    LoginSucceeded,
    LoginFailed,
    AccountLocked,
    TokenRefreshed,
    Logout,
    LogoutAll,
    UserDeactivated,
    ApplicationCreated,
    ApplicationStatusChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "user_registered",
            AuditAction::LoginSucceeded => "login_succeeded",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::AccountLocked => "account_locked",
            AuditAction::TokenRefreshed => "token_refreshed",
            AuditAction::Logout => "logout",
            AuditAction::LogoutAll => "logout_all",
            AuditAction::UserDeactivated => "user_deactivated",
            AuditAction::ApplicationCreated => "application_created",
            AuditAction::ApplicationStatusChanged => "application_status_changed",
        }
    }
}

/// Request metadata recorded alongside every audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub audit_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_id: Option<Uuid>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor_user_id: Option<Uuid>,
        action: AuditAction,
        resource_id: Option<Uuid>,
        meta: &RequestMeta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            actor_user_id,
            action,
            resource_id,
            before: None,
            after: None,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            created_utc: now,
        }
    }

    pub fn with_snapshots(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before = before;
        self.after = after;
        self
    }
}
