use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, Session, UserId, session::SessionToken};

/// Repository for session data access
///
/// Implementations store [`SessionToken::hash`], never the raw token.
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    /// Create a new session
    async fn create(&self, session: Session) -> Result<Session, Error>;

    /// Find a session by token
    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error>;

    /// Delete a session by token. Deleting an unknown token is not an error.
    async fn delete(&self, token: &SessionToken) -> Result<(), Error>;

    /// Delete all sessions for a user
    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error>;

    /// Delete sessions that expired before `now`, returning how many were removed
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error>;
}
