use async_trait::async_trait;

use crate::{
    Error, User, UserId,
    storage::{NewUser, StoredCredential},
};

/// Repository for user data access
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Create a new user. The email is stored normalized.
    async fn create(&self, user: NewUser) -> Result<User, Error>;

    /// Find a user by ID
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error>;

    /// Find a user by email, compared after normalization
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    /// Find the stored password hash for an email
    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredCredential>, Error>;
}
