use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error, error::utilities::DatabaseResultExt, repositories::AccountAttemptRepository,
    storage::AccountAttemptFields, throttle::normalize_identifier,
};
use sqlx::SqlitePool;

use super::from_unix_opt;

/// Reads and writes `users.login_attempts` and `users.last_login_attempt`.
pub struct SqliteAccountAttemptRepository {
    pool: SqlitePool,
}

impl SqliteAccountAttemptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountAttemptRepository for SqliteAccountAttemptRepository {
    async fn record_login_attempt(&self, email: &str, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET login_attempts = login_attempts + 1, last_login_attempt = ?1
            WHERE email = ?2
            "#,
        )
        .bind(at.timestamp())
        .bind(normalize_identifier(email))
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to record login attempt")?;

        Ok(())
    }

    async fn reset_login_attempts(&self, email: &str) -> Result<(), Error> {
        sqlx::query("UPDATE users SET login_attempts = 0 WHERE email = ?1")
            .bind(normalize_identifier(email))
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to reset login attempts")?;

        Ok(())
    }

    async fn get_login_attempts(
        &self,
        email: &str,
    ) -> Result<Option<AccountAttemptFields>, Error> {
        let row: Option<(i64, Option<i64>)> = sqlx::query_as(
            "SELECT login_attempts, last_login_attempt FROM users WHERE email = ?1",
        )
        .bind(normalize_identifier(email))
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(|(login_attempts, last_login_attempt)| {
            Ok(AccountAttemptFields {
                login_attempts,
                last_login_attempt: from_unix_opt(last_login_attempt)?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{tests::setup_pool, user::SqliteUserRepository};
    use portcullis_core::{repositories::UserRepository, storage::NewUser};

    async fn setup() -> SqliteAccountAttemptRepository {
        let pool = setup_pool().await;
        SqliteUserRepository::new(pool.clone())
            .create(
                NewUser::builder()
                    .email("alice@example.com")
                    .password_hash("hash")
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        SqliteAccountAttemptRepository::new(pool)
    }

    #[tokio::test]
    async fn test_new_accounts_start_at_zero() {
        let repo = setup().await;
        let fields = repo.get_login_attempts("alice@example.com").await.unwrap();
        assert_eq!(fields, Some(AccountAttemptFields::default()));
    }

    #[tokio::test]
    async fn test_record_and_reset() {
        let repo = setup().await;
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        repo.record_login_attempt("Alice@Example.com", at).await.unwrap();
        repo.record_login_attempt("alice@example.com", at).await.unwrap();

        let fields = repo.get_login_attempts("alice@example.com").await.unwrap().unwrap();
        assert_eq!(fields.login_attempts, 2);
        assert_eq!(fields.last_login_attempt, Some(at));

        repo.reset_login_attempts("alice@example.com").await.unwrap();
        let fields = repo.get_login_attempts("alice@example.com").await.unwrap().unwrap();
        assert_eq!(fields.login_attempts, 0);
        assert_eq!(fields.last_login_attempt, Some(at));
    }

    #[tokio::test]
    async fn test_unknown_email_is_a_no_op() {
        let repo = setup().await;
        repo.record_login_attempt("nobody@example.com", Utc::now())
            .await
            .unwrap();
        assert!(repo.get_login_attempts("nobody@example.com").await.unwrap().is_none());
    }
}
