use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    Error, Session, User, UserId,
    repositories::{
        AccountAttemptRepository, AttemptLedger, RepositoryProvider, SessionRepository,
        UserRepository,
    },
    session::SessionToken,
    storage::{AccountAttemptFields, AttemptRecord, NewUser, StoredCredential},
    throttle::ThrottleKey,
};

/// Adapter that wraps a RepositoryProvider and implements individual repository traits
pub struct UserRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UserRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UserRepository for UserRepositoryAdapter<R> {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.provider.user().create(user).await
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.provider.user().find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.provider.user().find_by_email(email).await
    }

    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredCredential>, Error> {
        self.provider.user().find_credential_by_email(email).await
    }
}

pub struct SessionRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> SessionRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> SessionRepository for SessionRepositoryAdapter<R> {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.provider.session().create(session).await
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        self.provider.session().find_by_token(token).await
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        self.provider.session().delete(token).await
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        self.provider.session().delete_by_user_id(user_id).await
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.session().cleanup_expired(now).await
    }
}

pub struct AttemptLedgerAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AttemptLedgerAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AttemptLedger for AttemptLedgerAdapter<R> {
    async fn record_failure(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error> {
        self.provider
            .attempt_ledger()
            .record_failure(key, now, decay)
            .await
    }

    async fn clear(&self, key: &ThrottleKey) -> Result<(), Error> {
        self.provider.attempt_ledger().clear(key).await
    }

    async fn snapshot(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error> {
        self.provider.attempt_ledger().snapshot(key, now, decay).await
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.attempt_ledger().purge_expired(before).await
    }
}

pub struct AccountAttemptRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AccountAttemptRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AccountAttemptRepository for AccountAttemptRepositoryAdapter<R> {
    async fn record_login_attempt(&self, email: &str, at: DateTime<Utc>) -> Result<(), Error> {
        self.provider
            .account_attempts()
            .record_login_attempt(email, at)
            .await
    }

    async fn reset_login_attempts(&self, email: &str) -> Result<(), Error> {
        self.provider
            .account_attempts()
            .reset_login_attempts(email)
            .await
    }

    async fn get_login_attempts(
        &self,
        email: &str,
    ) -> Result<Option<AccountAttemptFields>, Error> {
        self.provider.account_attempts().get_login_attempts(email).await
    }
}
