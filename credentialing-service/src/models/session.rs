//! Session model - a revocable binding of a user to an access/refresh pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

/// Client device details captured at login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    /// Caller-supplied label such as "Front desk iPad".
    pub device_name: Option<String>,
}

/// Session entity. Tokens are kept only as SHA-256 digests.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub remember_me: bool,
    pub expires_utc: DateTime<Utc>,
    pub is_active: bool,
    pub device_info: DeviceInfo,
    pub ip_address: Option<String>,
    pub last_used_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

/// Fields needed to open a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub remember_me: bool,
    pub expires_utc: DateTime<Utc>,
    pub device_info: DeviceInfo,
    pub ip_address: Option<String>,
}

impl Session {
    pub fn open(new: NewSession, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: new.user_id,
            access_token_hash: hash_token(&new.access_token),
            refresh_token_hash: hash_token(&new.refresh_token),
            remember_me: new.remember_me,
            expires_utc: new.expires_utc,
            is_active: true,
            device_info: new.device_info,
            ip_address: new.ip_address,
            last_used_utc: now,
            created_utc: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc <= now
    }

    /// Usable only while active and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

/// Hex SHA-256 digest of a bearer token, as stored in the ledger.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Outcome of looking a session up by refresh token.
#[derive(Debug, Clone)]
pub enum RefreshLookup {
    Active(Session),
    /// The session existed but was past expiry; it has been deactivated.
    Expired,
    NotFound,
}

/// Session info for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(s: &Session) -> Self {
        Self {
            id: s.session_id,
            expires_at: s.expires_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn open_session_stores_digests_not_tokens() {
        let now = Utc::now();
        let session = Session::open(
            NewSession {
                user_id: Uuid::new_v4(),
                access_token: "access.jwt".to_string(),
                refresh_token: "refresh.jwt".to_string(),
                remember_me: false,
                expires_utc: now + Duration::days(7),
                device_info: DeviceInfo::default(),
                ip_address: None,
            },
            now,
        );

        assert_ne!(session.access_token_hash, "access.jwt");
        assert_eq!(session.access_token_hash, hash_token("access.jwt"));
        assert_eq!(session.refresh_token_hash.len(), 64);
        assert!(session.is_usable(now));
        assert!(!session.is_usable(now + Duration::days(7)));
    }
}
