//! Shared harness for the credentialing-service integration tests.
//!
//! Drives the real router against the in-memory store and a manual clock.

#![allow(dead_code)]

use argon2::Params;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use credentialing_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, JwtConfig, LockoutConfig, PasswordHashConfig,
        RateLimitConfig, SecurityConfig, ServiceConfig, SwaggerConfig, SwaggerMode,
    },
    models::{AuditAction, NewUser, Role, User},
    services::ManualClock,
    store::{CredentialStore, InMemoryStore, Stores},
    utils::{CredentialHasher, Password},
    AppState,
};
use http_body_util::BodyExt;
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

/// Access and refresh token pair from an auth response.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

impl Tokens {
    pub fn from_body(body: &Value) -> Self {
        Self {
            access: body["tokens"]["accessToken"].as_str().unwrap().to_string(),
            refresh: body["tokens"]["refreshToken"].as_str().unwrap().to_string(),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    hasher: CredentialHasher,
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "credentialing-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout_seconds: 1,
            statement_timeout_ms: 1000,
        },
        jwt: JwtConfig {
            access_secret: Secret::new("test-access-secret-0123456789abcdefghij".to_string()),
            refresh_secret: Secret::new("test-refresh-secret-0123456789abcdefghij".to_string()),
            issuer: "credentialing-service".to_string(),
            access_token_expiry_minutes: 60,
            access_token_remember_me_days: 7,
            refresh_token_expiry_days: 7,
            refresh_token_remember_me_days: 30,
        },
        lockout: LockoutConfig {
            max_failed_attempts: 5,
            duration_minutes: 15,
        },
        password_hash: PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            timeout_ms: 5000,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 10_000,
            login_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let hasher = CredentialHasher::with_params(
            Params::new(1024, 1, 1, None).unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();

        let state = AppState::new(
            test_config(),
            Stores::in_memory(store.clone()),
            hasher.clone(),
            clock.clone(),
        )
        .expect("Failed to build state");

        Self {
            router: build_router(state),
            store,
            clock,
            hasher,
        }
    }

    /// Insert an active user with [`PASSWORD`].
    pub async fn seed_user(&self, email: &str, role: Role) -> User {
        let hash = self
            .hasher
            .hash(Password::new(PASSWORD.to_string()))
            .await
            .unwrap();
        let user = User::new(
            NewUser {
                email: email.to_string(),
                password_hash: hash.into_string(),
                first_name: "Test".to_string(),
                last_name: role.to_string(),
                phone: None,
                role,
            },
            start_time(),
        );
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::USER_AGENT, "integration-test/1.0")
            .header("x-forwarded-for", "198.51.100.20");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn login_ok(&self, email: &str) -> Tokens {
        let res = self.login(email, PASSWORD).await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
        Tokens::from_body(&res.body)
    }

    pub async fn refresh(&self, refresh_token: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh_token })),
        )
        .await
    }

    /// Audit actions recorded so far, after letting spawned audit writes run.
    pub async fn audit_actions(&self) -> Vec<AuditAction> {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        self.store
            .audit_entries()
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }
}
