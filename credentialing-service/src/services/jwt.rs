use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Role;

/// Type discriminator carried in every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims for both token types. `role` is only set on access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub typ: TokenType,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique per token, so two tokens issued in the same second differ.
    pub jti: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token type does not match")]
    WrongType,

    #[error("token is malformed")]
    Malformed,
}

/// A freshly signed token and the instant it stops verifying.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token lifetimes for a session, chosen by the remember-me flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

/// HS256 issuance and verification with separate access and refresh secrets.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    standard: TokenLifetimes,
    remember_me: TokenLifetimes,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let access = config.access_secret.expose_secret().as_bytes();
        let refresh = config.refresh_secret.expose_secret().as_bytes();
        if access == refresh {
            return Err(anyhow::anyhow!(
                "Access and refresh tokens must be signed with different secrets"
            ));
        }

        tracing::info!("Token service initialized with HS256 keys");

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access),
            access_decoding: DecodingKey::from_secret(access),
            refresh_encoding: EncodingKey::from_secret(refresh),
            refresh_decoding: DecodingKey::from_secret(refresh),
            issuer: config.issuer.clone(),
            standard: TokenLifetimes {
                access: Duration::minutes(config.access_token_expiry_minutes),
                refresh: Duration::days(config.refresh_token_expiry_days),
            },
            remember_me: TokenLifetimes {
                access: Duration::days(config.access_token_remember_me_days),
                refresh: Duration::days(config.refresh_token_remember_me_days),
            },
        })
    }

    pub fn lifetimes(&self, remember_me: bool) -> TokenLifetimes {
        if remember_me {
            self.remember_me
        } else {
            self.standard
        }
    }

    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        role: Role,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, anyhow::Error> {
        self.issue(user_id, Some(role), TokenType::Access, ttl, now)
    }

    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, anyhow::Error> {
        self.issue(user_id, None, TokenType::Refresh, ttl, now)
    }

    fn issue(
        &self,
        user_id: Uuid,
        role: Option<Role>,
        typ: TokenType,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, anyhow::Error> {
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user_id,
            role,
            typ,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, self.encoding_key(typ))
            .map_err(|e| anyhow::anyhow!("Failed to encode {:?} token: {}", typ, e))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature, type and expiry against `now`.
    ///
    /// The signature is checked before expiry, so `Expired` always means the
    /// token was genuinely issued by this service.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenType,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let claims = match self.decode_with(token, expected) {
            Ok(claims) => claims,
            Err(TokenError::InvalidSignature) => {
                let other = match expected {
                    TokenType::Access => TokenType::Refresh,
                    TokenType::Refresh => TokenType::Access,
                };
                return match self.decode_with(token, other) {
                    Ok(_) => Err(TokenError::WrongType),
                    Err(_) => Err(TokenError::InvalidSignature),
                };
            }
            Err(e) => return Err(e),
        };

        if claims.typ != expected {
            return Err(TokenError::WrongType);
        }

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn decode_with(&self, token: &str, typ: TokenType) -> Result<Claims, TokenError> {
        // Expiry is checked by `verify` against the injected clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        decode::<Claims>(token, self.decoding_key(typ), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })
    }

    fn encoding_key(&self, typ: TokenType) -> &EncodingKey {
        match typ {
            TokenType::Access => &self.access_encoding,
            TokenType::Refresh => &self.refresh_encoding,
        }
    }

    fn decoding_key(&self, typ: TokenType) -> &DecodingKey {
        match typ {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn config() -> JwtConfig {
        JwtConfig {
            access_secret: Secret::new("access-secret-for-tests-0123456789abcdef".to_string()),
            refresh_secret: Secret::new("refresh-secret-for-tests-0123456789abcdef".to_string()),
            issuer: "credentialing-service".to_string(),
            access_token_expiry_minutes: 60,
            access_token_remember_me_days: 7,
            refresh_token_expiry_days: 7,
            refresh_token_remember_me_days: 30,
        }
    }

    #[test]
    fn test_access_token_round_trip() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let issued = service.issue_access_token(user_id, Role::Staff, Duration::hours(1), now)?;
        let claims = service.verify(&issued.token, TokenType::Access, now)?;

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Some(Role::Staff));
        assert_eq!(claims.typ, TokenType::Access);
        assert_eq!(claims.exp, (now + Duration::hours(1)).timestamp());

        Ok(())
    }

    #[test]
    fn test_refresh_token_round_trip() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let issued = service.issue_refresh_token(user_id, Duration::days(7), now)?;
        let claims = service.verify(&issued.token, TokenType::Refresh, now)?;

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, None);

        Ok(())
    }

    #[test]
    fn test_wrong_type_is_detected_both_ways() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;
        let now = Utc::now();
        let access = service.issue_access_token(Uuid::new_v4(), Role::Client, Duration::hours(1), now)?;
        let refresh = service.issue_refresh_token(Uuid::new_v4(), Duration::days(7), now)?;

        assert_eq!(
            service.verify(&access.token, TokenType::Refresh, now).unwrap_err(),
            TokenError::WrongType
        );
        assert_eq!(
            service.verify(&refresh.token, TokenType::Access, now).unwrap_err(),
            TokenError::WrongType
        );

        Ok(())
    }

    #[test]
    fn test_expiry_uses_injected_clock() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;
        let now = Utc::now();
        let issued = service.issue_access_token(Uuid::new_v4(), Role::Client, Duration::hours(1), now)?;

        assert!(service
            .verify(&issued.token, TokenType::Access, now + Duration::minutes(59))
            .is_ok());
        assert_eq!(
            service
                .verify(&issued.token, TokenType::Access, now + Duration::hours(1))
                .unwrap_err(),
            TokenError::Expired
        );

        Ok(())
    }

    #[test]
    fn test_foreign_signature_is_rejected() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;
        let mut other_config = config();
        other_config.access_secret = Secret::new("a-completely-different-secret-0123456789".to_string());
        let other = TokenService::new(&other_config)?;
        let now = Utc::now();

        let forged = other.issue_access_token(Uuid::new_v4(), Role::SuperAdmin, Duration::hours(1), now)?;

        assert_eq!(
            service.verify(&forged.token, TokenType::Access, now).unwrap_err(),
            TokenError::InvalidSignature
        );

        Ok(())
    }

    #[test]
    fn test_garbage_is_malformed() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;

        assert_eq!(
            service
                .verify("not.a.jwt", TokenType::Access, Utc::now())
                .unwrap_err(),
            TokenError::Malformed
        );

        Ok(())
    }

    #[test]
    fn test_same_second_tokens_differ() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let first = service.issue_access_token(user_id, Role::Client, Duration::hours(1), now)?;
        let second = service.issue_access_token(user_id, Role::Client, Duration::hours(1), now)?;

        assert_ne!(first.token, second.token);

        Ok(())
    }

    #[test]
    fn test_lifetimes_follow_remember_me() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config())?;

        assert_eq!(
            service.lifetimes(false),
            TokenLifetimes {
                access: Duration::hours(1),
                refresh: Duration::days(7)
            }
        );
        assert_eq!(
            service.lifetimes(true),
            TokenLifetimes {
                access: Duration::days(7),
                refresh: Duration::days(30)
            }
        );

        Ok(())
    }

    #[test]
    fn test_identical_secrets_are_refused() {
        let mut cfg = config();
        cfg.refresh_secret = Secret::new("access-secret-for-tests-0123456789abcdef".to_string());
        assert!(TokenService::new(&cfg).is_err());
    }
}
