use chrono::{DateTime, Utc};
use service_core::error::{codes, AppError};
use thiserror::Error;

use crate::models::ApplicationStatus;
use crate::store::StoreError;
use crate::utils::password::PasswordError;

/// Why the auth gate turned a request away. Logged, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    BadSignature,
    Expired,
    WrongType,
    Malformed,
    SessionRevoked,
    AccountInactive,
    AccountLocked,
    UnknownUser,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is temporarily locked")]
    AccountLocked {
        until: DateTime<Utc>,
        retry_after_seconds: u64,
    },

    #[error("Account is not active")]
    AccountInactive,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session has expired")]
    SessionExpired,

    #[error("Authentication required ({0:?})")]
    Unauthenticated(AuthFailure),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Application was modified concurrently")]
    ConcurrentUpdate,

    #[error("Email already registered")]
    EmailInUse,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => ServiceError::Timeout("store"),
            StoreError::Duplicate(constraint) => ServiceError::Store(anyhow::anyhow!(
                "Unexpected unique constraint violation: {}",
                constraint
            )),
            StoreError::Backend(e) => ServiceError::Store(e),
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Timeout => ServiceError::Timeout("password hashing"),
            PasswordError::Failed(e) => ServiceError::Internal(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized("INVALID_CREDENTIALS", anyhow::anyhow!(message))
            }
            ServiceError::AccountLocked {
                retry_after_seconds,
                ..
            } => AppError::Locked(
                "ACCOUNT_LOCKED",
                anyhow::anyhow!(message),
                Some(retry_after_seconds),
            ),
            ServiceError::AccountInactive => {
                AppError::Forbidden("ACCOUNT_INACTIVE", anyhow::anyhow!(message))
            }
            ServiceError::InvalidRefreshToken => {
                AppError::Unauthorized("INVALID_REFRESH_TOKEN", anyhow::anyhow!(message))
            }
            ServiceError::SessionNotFound => {
                AppError::Unauthorized("SESSION_NOT_FOUND", anyhow::anyhow!(message))
            }
            ServiceError::SessionExpired => {
                AppError::Unauthorized("SESSION_EXPIRED", anyhow::anyhow!(message))
            }
            ServiceError::Unauthenticated(_) => AppError::Unauthorized(
                codes::UNAUTHENTICATED,
                anyhow::anyhow!("Authentication required"),
            ),
            ServiceError::Forbidden(_) => AppError::Forbidden(
                codes::FORBIDDEN,
                anyhow::anyhow!("You do not have permission to perform this action"),
            ),
            ServiceError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::IllegalTransition { .. } => {
                AppError::Conflict("ILLEGAL_TRANSITION", anyhow::anyhow!(message))
            }
            ServiceError::ConcurrentUpdate => {
                AppError::Conflict("CONCURRENT_UPDATE", anyhow::anyhow!(message))
            }
            ServiceError::EmailInUse => {
                AppError::Conflict("EMAIL_IN_USE", anyhow::anyhow!(message))
            }
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Timeout(what) => {
                AppError::ServiceUnavailable(format!("{} timed out", what))
            }
            ServiceError::Store(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn business_outcomes_map_to_their_codes() {
        let cases: Vec<(ServiceError, StatusCode, &str)> = vec![
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            (
                ServiceError::AccountLocked {
                    until: Utc::now(),
                    retry_after_seconds: 60,
                },
                StatusCode::LOCKED,
                "ACCOUNT_LOCKED",
            ),
            (ServiceError::AccountInactive, StatusCode::FORBIDDEN, "ACCOUNT_INACTIVE"),
            (ServiceError::InvalidRefreshToken, StatusCode::UNAUTHORIZED, "INVALID_REFRESH_TOKEN"),
            (ServiceError::SessionNotFound, StatusCode::UNAUTHORIZED, "SESSION_NOT_FOUND"),
            (ServiceError::SessionExpired, StatusCode::UNAUTHORIZED, "SESSION_EXPIRED"),
            (
                ServiceError::Unauthenticated(AuthFailure::SessionRevoked),
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
            ),
            (ServiceError::Forbidden("role"), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (ServiceError::NotFound("Application"), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                ServiceError::IllegalTransition {
                    from: ApplicationStatus::Rejected,
                    to: ApplicationStatus::Approved,
                },
                StatusCode::CONFLICT,
                "ILLEGAL_TRANSITION",
            ),
            (ServiceError::ConcurrentUpdate, StatusCode::CONFLICT, "CONCURRENT_UPDATE"),
            (ServiceError::EmailInUse, StatusCode::CONFLICT, "EMAIL_IN_USE"),
            (ServiceError::Timeout("store"), StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            (
                ServiceError::Store(anyhow::anyhow!("connection reset")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn unauthenticated_reason_is_not_rendered() {
        let app: AppError = ServiceError::Unauthenticated(AuthFailure::AccountLocked).into();
        assert!(!app.to_string().contains("AccountLocked"));
    }
}
