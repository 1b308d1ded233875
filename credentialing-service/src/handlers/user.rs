use service_core::{
    axum::{
        extract::State,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    middleware::AuthUser,
    utils::{ClientMeta, ValidatedPath},
    AppState,
};

/// Current user's profile
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Profile of the authenticated user", body = UserResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.user_service.profile(&principal.user)?;
    Ok(Json(profile))
}

/// Deactivate a user and revoke all of their sessions
#[utoipa::path(
    post,
    path = "/users/{id}/deactivate",
    params(
        ("id" = Uuid, Path, description = "User to deactivate")
    ),
    responses(
        (status = 200, description = "User deactivated", body = UserResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 403, description = "Role not permitted, or own account", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    AuthUser(principal): AuthUser,
    ValidatedPath(user_id): ValidatedPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .user_service
        .deactivate(&principal.user, user_id, &meta)
        .await?;
    Ok(Json(user))
}
