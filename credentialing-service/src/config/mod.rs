use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub lockout: LockoutConfig,
    pub password_hash: PasswordHashConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: Secret<String>,
    pub refresh_secret: Secret<String>,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub access_token_remember_me_days: i64,
    pub refresh_token_expiry_days: i64,
    pub refresh_token_remember_me_days: i64,
}

#[derive(Debug, Clone)]
pub struct LockoutConfig {
    pub max_failed_attempts: i32,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = ServiceConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("credentialing-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
                acquire_timeout_seconds: parse_env("DATABASE_ACQUIRE_TIMEOUT_SECONDS", "5")?,
                statement_timeout_ms: parse_env("DATABASE_STATEMENT_TIMEOUT_MS", "5000")?,
            },
            jwt: JwtConfig {
                access_secret: Secret::new(get_env("JWT_ACCESS_SECRET", None, is_prod)?),
                refresh_secret: Secret::new(get_env("JWT_REFRESH_SECRET", None, is_prod)?),
                issuer: get_env("JWT_ISSUER", Some("credentialing-service"), false)?,
                access_token_expiry_minutes: parse_env("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "60")?,
                access_token_remember_me_days: parse_env(
                    "JWT_ACCESS_TOKEN_REMEMBER_ME_DAYS",
                    "7",
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7")?,
                refresh_token_remember_me_days: parse_env(
                    "JWT_REFRESH_TOKEN_REMEMBER_ME_DAYS",
                    "30",
                )?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: parse_env("LOCKOUT_MAX_FAILED_ATTEMPTS", "5")?,
                duration_minutes: parse_env("LOCKOUT_DURATION_MINUTES", "15")?,
            },
            password_hash: PasswordHashConfig {
                memory_kib: parse_env("PASSWORD_HASH_MEMORY_KIB", "19456")?,
                iterations: parse_env("PASSWORD_HASH_ITERATIONS", "2")?,
                parallelism: parse_env("PASSWORD_HASH_PARALLELISM", "1")?,
                timeout_ms: parse_env("PASSWORD_HASH_TIMEOUT_MS", "5000")?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "10")?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "60")?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "300")?,
                global_ip_window_seconds: parse_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", "60")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        let access = self.jwt.access_secret.expose_secret();
        let refresh = self.jwt.refresh_secret.expose_secret();
        if access.len() < MIN_SECRET_BYTES || refresh.len() < MIN_SECRET_BYTES {
            return Err(config_error(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must be at least 32 bytes",
            ));
        }
        if access == refresh {
            return Err(config_error(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ",
            ));
        }

        if self.jwt.access_token_expiry_minutes <= 0
            || self.jwt.access_token_remember_me_days <= 0
        {
            return Err(config_error("Access token lifetimes must be positive"));
        }

        if self.jwt.refresh_token_expiry_days <= 0 || self.jwt.refresh_token_remember_me_days <= 0
        {
            return Err(config_error("Refresh token lifetimes must be positive"));
        }

        if self.lockout.max_failed_attempts <= 0 || self.lockout.duration_minutes <= 0 {
            return Err(config_error(
                "LOCKOUT_MAX_FAILED_ATTEMPTS and LOCKOUT_DURATION_MINUTES must be positive",
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(config_error(
                "DATABASE_MIN_CONNECTIONS cannot exceed DATABASE_MAX_CONNECTIONS",
            ));
        }

        if self.rate_limit.login_attempts == 0 || self.rate_limit.global_ip_limit == 0 {
            return Err(config_error("Rate limits must be greater than 0"));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::warn!("Swagger UI is publicly accessible in production");
            }
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServiceConfig {
        ServiceConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "credentialing-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: Secret::new("postgres://localhost/credentialing".to_string()),
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_seconds: 5,
                statement_timeout_ms: 5000,
            },
            jwt: JwtConfig {
                access_secret: Secret::new("a".repeat(32)),
                refresh_secret: Secret::new("r".repeat(32)),
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
                memory_kib: 19456,
                iterations: 2,
                parallelism: 1,
                timeout_ms: 5000,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            swagger: SwaggerConfig {
                enabled: SwaggerMode::Public,
            },
            rate_limit: RateLimitConfig {
                login_attempts: 10,
                login_window_seconds: 60,
                global_ip_limit: 300,
                global_ip_window_seconds: 60,
            },
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn identical_secrets_are_rejected() {
        let mut cfg = config();
        cfg.jwt.refresh_secret = Secret::new("a".repeat(32));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn short_secrets_are_rejected() {
        let mut cfg = config();
        cfg.jwt.access_secret = Secret::new("too-short".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn wildcard_origin_rejected_in_prod() {
        let mut cfg = config();
        cfg.environment = Environment::Prod;
        cfg.security.allowed_origins = vec!["*".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_environment_and_swagger_mode() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert_eq!("disabled".parse::<SwaggerMode>(), Ok(SwaggerMode::Disabled));
        assert!("authenticated".parse::<SwaggerMode>().is_err());
    }
}
