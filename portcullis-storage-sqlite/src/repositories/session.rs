use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error, Session, UserId, error::utilities::DatabaseResultExt,
    repositories::SessionRepository, session::SessionToken,
};
use sqlx::SqlitePool;

use super::from_unix;

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteSession {
    user_id: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: i64,
    updated_at: i64,
    expires_at: i64,
}

impl SqliteSession {
    /// Rows only hold the token hash, so the caller's token is reattached.
    fn into_session(self, token: &SessionToken) -> Result<Session, Error> {
        Session::builder()
            .token(token.clone())
            .user_id(UserId::new(&self.user_id))
            .user_agent(self.user_agent)
            .ip_address(self.ip_address)
            .created_at(from_unix(self.created_at)?)
            .updated_at(from_unix(self.updated_at)?)
            .expires_at(from_unix(self.expires_at)?)
            .build()
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, user_agent, ip_address, created_at, updated_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(session.token.hash())
        .bind(session.user_id.as_str())
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.created_at.timestamp())
        .bind(session.updated_at.timestamp())
        .bind(session.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to create session")?;

        Ok(session)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        let row = sqlx::query_as::<_, SqliteSession>(
            r#"
            SELECT user_id, user_agent, ip_address, created_at, updated_at, expires_at
            FROM sessions
            WHERE token_hash = ?1
            "#,
        )
        .bind(token.hash())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(|row| row.into_session(token)).transpose()
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?1")
            .bind(token.hash())
            .execute(&self.pool)
            .await
            .map_db_err()?;

        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err()?;

        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to clean up expired sessions")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{tests::setup_pool, user::SqliteUserRepository};
    use chrono::Duration;
    use portcullis_core::{repositories::UserRepository, storage::NewUser};

    async fn setup() -> (SqliteSessionRepository, UserId, SqlitePool) {
        let pool = setup_pool().await;
        let user = SqliteUserRepository::new(pool.clone())
            .create(
                NewUser::builder()
                    .email("alice@example.com")
                    .password_hash("hash")
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        (SqliteSessionRepository::new(pool.clone()), user.id, pool)
    }

    fn session(user_id: &UserId, expires_at: DateTime<Utc>) -> Session {
        Session::builder()
            .user_id(user_id.clone())
            .ip_address(Some("127.0.0.1".to_string()))
            .expires_at(expires_at)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_session() {
        let (repo, user_id, _) = setup().await;
        let created = repo
            .create(session(&user_id, Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        let found = repo.find_by_token(&created.token).await.unwrap().unwrap();
        assert_eq!(found.token, created.token);
        assert_eq!(found.user_id, user_id);
        assert_eq!(found.ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(found.expires_at.timestamp(), created.expires_at.timestamp());
    }

    #[tokio::test]
    async fn test_raw_token_is_not_stored() {
        let (repo, user_id, pool) = setup().await;
        let created = repo
            .create(session(&user_id, Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        let stored: String = sqlx::query_scalar("SELECT token_hash FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_ne!(stored, created.token.as_str());
        assert_eq!(stored, created.token.hash());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (repo, user_id, _) = setup().await;
        let created = repo
            .create(session(&user_id, Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        repo.delete(&created.token).await.unwrap();
        assert!(repo.find_by_token(&created.token).await.unwrap().is_none());

        // Deleting again is fine
        repo.delete(&created.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_by_user_id() {
        let (repo, user_id, _) = setup().await;
        let a = repo
            .create(session(&user_id, Utc::now() + Duration::days(1)))
            .await
            .unwrap();
        let b = repo
            .create(session(&user_id, Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        repo.delete_by_user_id(&user_id).await.unwrap();
        assert!(repo.find_by_token(&a.token).await.unwrap().is_none());
        assert!(repo.find_by_token(&b.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (repo, user_id, _) = setup().await;
        let now = Utc::now();
        let live = repo
            .create(session(&user_id, now + Duration::hours(1)))
            .await
            .unwrap();
        repo.create(session(&user_id, now - Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(repo.cleanup_expired(now).await.unwrap(), 1);
        assert!(repo.find_by_token(&live.token).await.unwrap().is_some());
    }
}
