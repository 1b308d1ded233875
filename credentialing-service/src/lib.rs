pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{ServiceConfig, SwaggerMode};
use crate::services::{
    ApplicationWorkflow, AuthService, Clock, TokenService, UserService,
};
use crate::store::{LockoutPolicy, Stores};
use crate::utils::CredentialHasher;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::registration::register,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::session::logout_all,
        handlers::user::get_me,
        handlers::user::deactivate_user,
        handlers::application::create_application,
        handlers::application::get_application,
        handlers::application::transition_status,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::TokenPair,
            dtos::auth::AuthResponse,
            dtos::auth::LogoutAllResponse,
            dtos::application::CreateApplicationRequest,
            dtos::application::TransitionRequest,
            models::UserResponse,
            models::SessionInfo,
            models::Role,
            models::AccountStatus,
            models::Application,
            models::ApplicationStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, registration and session lifecycle"),
        (name = "User", description = "User profile and administration"),
        (name = "Applications", description = "Credentialing applications and their status workflow"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub stores: Stores,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub workflow: ApplicationWorkflow,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every service onto the given stores and clock.
    pub fn new(
        config: ServiceConfig,
        stores: Stores,
        hasher: CredentialHasher,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let tokens = TokenService::new(&config.jwt).map_err(AppError::ConfigError)?;
        let lockout = LockoutPolicy {
            max_failed_attempts: config.lockout.max_failed_attempts,
            lockout_duration: chrono::Duration::minutes(config.lockout.duration_minutes),
        };

        let auth_service = AuthService::new(
            stores.credentials.clone(),
            stores.sessions.clone(),
            stores.audit.clone(),
            tokens,
            hasher,
            clock.clone(),
            lockout,
        );
        let user_service = UserService::new(
            stores.credentials.clone(),
            stores.sessions.clone(),
            stores.audit.clone(),
            clock.clone(),
        );
        let workflow = ApplicationWorkflow::new(stores.applications.clone(), stores.audit.clone(), clock);

        let rate_limit = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(rate_limit.login_attempts, rate_limit.login_window_seconds);
        let register_rate_limiter =
            create_ip_rate_limiter(rate_limit.login_attempts, rate_limit.login_window_seconds);
        let ip_rate_limiter = create_ip_rate_limiter(
            rate_limit.global_ip_limit,
            rate_limit.global_ip_window_seconds,
        );

        Ok(Self {
            config: Arc::new(config),
            stores,
            auth_service,
            user_service,
            workflow,
            login_rate_limiter,
            register_rate_limiter,
            ip_rate_limiter,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    // Credential endpoints get their own, tighter per-IP limits
    let login_route = Router::new()
        .route("/auth/login", post(handlers::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::register))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/auth/logout-all", post(handlers::logout_all))
        .route("/users/me", get(handlers::get_me))
        .route("/users/:id/deactivate", post(handlers::deactivate_user))
        .route("/applications", post(handlers::create_application))
        .route("/applications/:id", get(handlers::get_application))
        .route("/applications/:id/status", patch(handlers::transition_status))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new().route("/health", get(health_check));

    if state.config.swagger.enabled == SwaggerMode::Public {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Keep the OpenAPI JSON available for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let allowed_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("Ignoring invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    app.merge(login_route)
        .merge(register_route)
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .merge(protected_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.stores.health.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable("store unreachable".to_string())
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
    })))
}
