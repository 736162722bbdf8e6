//! Session establishment and lookup
//!
//! [`SessionManager`] is the seam the login flow uses once a principal has been verified.
//! [`OpaqueSessionManager`] is the stateful implementation: random opaque tokens backed by a
//! [`SessionRepository`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use crate::{
    Error, Session, UserId,
    clock::{Clock, SystemClock},
    error::SessionError,
    repositories::SessionRepository,
};

use super::{ClientInfo, SessionToken};

#[async_trait]
pub trait SessionManager: Send + Sync + 'static {
    /// Create a fresh session for an authenticated principal.
    async fn establish(
        &self,
        user_id: &UserId,
        client: &ClientInfo,
        lifetime: Duration,
    ) -> Result<Session, Error>;

    /// Invalidate the session the client held before authenticating, so a token planted
    /// before login cannot ride along into the authenticated session.
    async fn regenerate(&self, previous: &SessionToken) -> Result<(), Error>;

    /// Look up a live session. Expired sessions are deleted and reported as
    /// [`SessionError::Expired`].
    async fn get_session(&self, token: &SessionToken) -> Result<Session, Error>;

    async fn revoke(&self, token: &SessionToken) -> Result<(), Error>;

    async fn revoke_all_for_user(&self, user_id: &UserId) -> Result<(), Error>;

    /// Remove expired sessions, returning how many were deleted.
    async fn cleanup_expired_sessions(&self) -> Result<u64, Error>;
}

/// Opaque token session manager
///
/// Each lookup requires a storage query.
pub struct OpaqueSessionManager<R: SessionRepository + ?Sized> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R: SessionRepository + ?Sized> OpaqueSessionManager<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }
}

#[async_trait]
impl<R: SessionRepository + ?Sized> SessionManager for OpaqueSessionManager<R> {
    async fn establish(
        &self,
        user_id: &UserId,
        client: &ClientInfo,
        lifetime: Duration,
    ) -> Result<Session, Error> {
        let now = self.clock.now();
        let session = Session::builder()
            .token(SessionToken::new_random())
            .user_id(user_id.clone())
            .client(client)
            .created_at(now)
            .expires_at(
                now.checked_add_signed(lifetime)
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC),
            )
            .build()?;

        let session = self.repository.create(session).await?;
        tracing::debug!(user_id = %user_id, "Session established");
        Ok(session)
    }

    async fn regenerate(&self, previous: &SessionToken) -> Result<(), Error> {
        self.repository.delete(previous).await?;
        tracing::debug!("Previous session invalidated");
        Ok(())
    }

    async fn get_session(&self, token: &SessionToken) -> Result<Session, Error> {
        let Some(session) = self.repository.find_by_token(token).await? else {
            return Err(Error::Session(SessionError::NotFound));
        };

        if session.is_expired_at(self.clock.now()) {
            self.repository.delete(token).await?;
            return Err(Error::Session(SessionError::Expired));
        }

        Ok(session)
    }

    async fn revoke(&self, token: &SessionToken) -> Result<(), Error> {
        self.repository.delete(token).await
    }

    async fn revoke_all_for_user(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.delete_by_user_id(user_id).await
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, Error> {
        self.repository.cleanup_expired(self.clock.now()).await
    }
}
