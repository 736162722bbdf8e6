//! Credential verification
//!
//! Passwords are hashed with the `password_auth` crate (argon2). Hashing and verification
//! are CPU-bound, so they run on tokio's blocking pool.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{
    Error, UserId, error::AuthError, repositories::UserRepository,
    throttle::normalize_identifier,
};

/// Result of checking a credential.
///
/// Unknown identifiers and wrong secrets both produce [`AuthResult::Rejected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated(UserId),
    Rejected,
}

impl AuthResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthResult::Authenticated(_))
    }
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync + 'static {
    async fn verify(&self, identifier: &str, secret: &SecretString) -> Result<AuthResult, Error>;
}

/// Hash compared against when the identifier is unknown, so both rejection paths cost one
/// argon2 verification.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| password_auth::generate_hash("portcullis-dummy-password"));

/// Verifies email/password pairs against hashes stored through a [`UserRepository`].
pub struct PasswordCredentialVerifier<U: UserRepository + ?Sized> {
    users: Arc<U>,
}

impl<U: UserRepository + ?Sized> PasswordCredentialVerifier<U> {
    pub fn new(users: Arc<U>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl<U: UserRepository + ?Sized> CredentialVerifier for PasswordCredentialVerifier<U> {
    async fn verify(&self, identifier: &str, secret: &SecretString) -> Result<AuthResult, Error> {
        let email = normalize_identifier(identifier);
        let stored = self.users.find_credential_by_email(&email).await?;

        let (user_id, hash) = match stored {
            Some(credential) => (Some(credential.user_id), Some(credential.password_hash)),
            None => (None, None),
        };

        let matches = verify_or_dummy(secret, hash).await?;
        match user_id {
            Some(user_id) if matches => Ok(AuthResult::Authenticated(user_id)),
            _ => Ok(AuthResult::Rejected),
        }
    }
}

/// Hash a password using argon2.
pub async fn hash_password(password: &SecretString) -> Result<String, Error> {
    let password = SecretString::from(password.expose_secret().to_owned());
    tokio::task::spawn_blocking(move || password_auth::generate_hash(password.expose_secret()))
        .await
        .map_err(|e| Error::Auth(AuthError::PasswordHashError(e.to_string())))
}

/// Verify a password against a PHC hash string. A malformed hash counts as a mismatch.
pub async fn verify_password(password: &SecretString, hash: String) -> Result<bool, Error> {
    verify_or_dummy(password, Some(hash)).await
}

/// Without a stored hash the password is checked against [`DUMMY_HASH`], which is first
/// built on the blocking pool.
async fn verify_or_dummy(password: &SecretString, hash: Option<String>) -> Result<bool, Error> {
    let password = SecretString::from(password.expose_secret().to_owned());
    tokio::task::spawn_blocking(move || {
        let hash = hash.as_deref().unwrap_or(DUMMY_HASH.as_str());
        password_auth::verify_password(password.expose_secret(), hash).is_ok()
    })
    .await
    .map_err(|e| Error::Auth(AuthError::PasswordHashError(e.to_string())))
}
