use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{SessionInfo, UserResponse};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(deserialize_with = "super::trimmed")]
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "dr.lee@clinic.org")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "correct-horse-battery", min_length = 8)]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    #[schema(example = "Jordan")]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    #[schema(example = "Lee")]
    pub last_name: String,

    #[validate(length(max = 32, message = "Phone number is too long"))]
    #[schema(example = "+1-555-0100")]
    pub phone: Option<String>,

    #[validate(length(max = 100))]
    #[schema(example = "Front desk iPad")]
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(deserialize_with = "super::trimmed")]
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "dr.lee@clinic.org")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "correct-horse-battery")]
    pub password: String,

    #[serde(default)]
    #[schema(example = false)]
    pub remember_me: bool,

    #[validate(length(max = 100))]
    #[schema(example = "Front desk iPad")]
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    #[schema(example = "eyJhbGciOiJIUzI1NiJ9...")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    #[schema(example = 3600)]
    pub expires_in: i64,
}

/// Returned by register, login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokenPair,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    #[schema(example = 3)]
    pub sessions_revoked: u64,
}
