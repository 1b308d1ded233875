use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::PasswordHashConfig;

/// Plaintext password. `Debug` never prints the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for an encoded Argon2 hash (PHC string format).
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing timed out")]
    Timeout,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Argon2id hashing with configured cost parameters.
///
/// Hashing and verification run on the blocking pool under a timeout.
#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
    timeout: Duration,
    dummy_hash: PasswordHashString,
}

impl CredentialHasher {
    pub fn new(config: &PasswordHashConfig) -> Result<Self, anyhow::Error> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Self::with_params(params, Duration::from_millis(config.timeout_ms))
    }

    pub fn with_params(params: Params, timeout: Duration) -> Result<Self, anyhow::Error> {
        // Hash of a throwaway value, verified against when the email is
        // unknown so that path costs the same as a wrong password.
        let dummy_hash = hash_with(
            &argon2(&params),
            &Password::new(uuid::Uuid::new_v4().to_string()),
        )?;

        Ok(Self {
            params,
            timeout,
            dummy_hash,
        })
    }

    pub async fn hash(&self, password: Password) -> Result<PasswordHashString, PasswordError> {
        let params = self.params.clone();
        self.run_blocking(move || hash_with(&argon2(&params), &password))
            .await
    }

    /// `Ok(false)` for a wrong password; `Err` only when the work itself failed.
    pub async fn verify(
        &self,
        password: Password,
        hash: PasswordHashString,
    ) -> Result<bool, PasswordError> {
        let params = self.params.clone();
        self.run_blocking(move || verify_with(&argon2(&params), &password, &hash))
            .await
    }

    /// Burn one verification against the dummy hash. The result is discarded.
    pub async fn verify_dummy(&self, password: Password) -> Result<(), PasswordError> {
        self.verify(password, self.dummy_hash.clone()).await.map(|_| ())
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, PasswordError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, anyhow::Error> + Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(result)) => result.map_err(PasswordError::Failed),
            Ok(Err(join_error)) => Err(PasswordError::Failed(anyhow::anyhow!(
                "Password hashing task failed: {}",
                join_error
            ))),
            Err(_) => Err(PasswordError::Timeout),
        }
    }
}

fn argon2(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(argon2: &Argon2<'_>, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

fn verify_with(
    argon2: &Argon2<'_>,
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    match argon2.verify_password(password.as_str().as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        let params = Params::new(1024, 1, 1, None).unwrap();
        CredentialHasher::with_params(params, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_hash_password() {
        let hash = hasher()
            .hash(Password::new("mySecurePassword123".to_string()))
            .await
            .expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_verify_password() {
        let hasher = hasher();
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher.hash(password.clone()).await.unwrap();

        assert!(hasher.verify(password, hash.clone()).await.unwrap());
        assert!(!hasher
            .verify(Password::new("wrongPassword".to_string()), hash)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_an_error() {
        let result = hasher()
            .verify(
                Password::new("whatever".to_string()),
                PasswordHashString::new("not-a-phc-string".to_string()),
            )
            .await;

        assert!(matches!(result, Err(PasswordError::Failed(_))));
    }

    #[tokio::test]
    async fn test_different_hashes_for_same_password() {
        let hasher = hasher();
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = hasher.hash(password.clone()).await.unwrap();
        let hash2 = hasher.hash(password).await.unwrap();

        assert_ne!(hash1.as_str(), hash2.as_str());
    }

    #[tokio::test]
    async fn test_dummy_verification_succeeds_quietly() {
        assert!(hasher()
            .verify_dummy(Password::new("anything".to_string()))
            .await
            .is_ok());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("hunter2".to_string());
        assert_eq!(format!("{:?}", password), "Password(***)");
    }
}
