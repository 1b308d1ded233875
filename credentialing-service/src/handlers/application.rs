use service_core::{
    axum::{
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::application::{CreateApplicationRequest, TransitionRequest},
    middleware::AuthUser,
    utils::{ClientMeta, ValidatedJson, ValidatedPath},
    AppState,
};

/// Start a new application in draft
#[utoipa::path(
    post,
    path = "/applications",
    request_body = CreateApplicationRequest,
    responses(
        (status = 201, description = "Application created", body = Application),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse)
    ),
    tag = "Applications",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_application(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    AuthUser(principal): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let application = state
        .workflow
        .create_draft(&principal.user, req.service_type, req.notes, &meta)
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// Fetch an application
#[utoipa::path(
    get,
    path = "/applications/{id}",
    params(
        ("id" = Uuid, Path, description = "Application ID")
    ),
    responses(
        (status = 200, description = "Application", body = Application),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 403, description = "Not visible to this user", body = ErrorResponse),
        (status = 404, description = "Application not found", body = ErrorResponse)
    ),
    tag = "Applications",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_application(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidatedPath(application_id): ValidatedPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let application = state.workflow.get(&principal.user, application_id).await?;
    Ok(Json(application))
}

/// Move an application along the status graph
#[utoipa::path(
    patch,
    path = "/applications/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Application ID")
    ),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = Application),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 403, description = "Transition not permitted for this user", body = ErrorResponse),
        (status = 404, description = "Application not found", body = ErrorResponse),
        (status = 409, description = "Illegal transition or concurrent update", body = ErrorResponse)
    ),
    tag = "Applications",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn transition_status(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    AuthUser(principal): AuthUser,
    ValidatedPath(application_id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<TransitionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let application = state
        .workflow
        .transition(&principal.user, application_id, req.target_status, &meta)
        .await?;
    Ok(Json(application))
}
