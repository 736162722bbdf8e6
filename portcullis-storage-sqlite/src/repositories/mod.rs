//! Repository implementations for SQLite storage

pub mod account_attempts;
pub mod attempt_ledger;
pub mod session;
pub mod user;

pub use account_attempts::SqliteAccountAttemptRepository;
pub use attempt_ledger::SqliteAttemptLedger;
pub use session::SqliteSessionRepository;
pub use user::SqliteUserRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error,
    error::StorageError,
    repositories::{
        AccountAttemptRepositoryProvider, AttemptLedgerProvider, RepositoryProvider,
        SessionRepositoryProvider, UserRepositoryProvider,
    },
};
use portcullis_migration::MigrationManager;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::migrations::{self, SqliteMigrationManager};

/// Repository provider implementation for SQLite
///
/// This struct implements all the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    user: Arc<SqliteUserRepository>,
    session: Arc<SqliteSessionRepository>,
    attempt_ledger: Arc<SqliteAttemptLedger>,
    account_attempts: Arc<SqliteAccountAttemptRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let user = Arc::new(SqliteUserRepository::new(pool.clone()));
        let session = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let attempt_ledger = Arc::new(SqliteAttemptLedger::new(pool.clone()));
        let account_attempts = Arc::new(SqliteAccountAttemptRepository::new(pool.clone()));

        Self {
            pool,
            user,
            session,
            attempt_ledger,
            account_attempts,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Roll back every applied migration, newest first.
    pub async fn rollback(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.down(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to roll back migrations");
            Error::Storage(StorageError::Migration(
                "Failed to roll back migrations".to_string(),
            ))
        })
    }
}

impl UserRepositoryProvider for SqliteRepositoryProvider {
    type UserRepo = SqliteUserRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl SessionRepositoryProvider for SqliteRepositoryProvider {
    type SessionRepo = SqliteSessionRepository;

    fn session(&self) -> &Self::SessionRepo {
        &self.session
    }
}

impl AttemptLedgerProvider for SqliteRepositoryProvider {
    type Ledger = SqliteAttemptLedger;

    fn attempt_ledger(&self) -> &Self::Ledger {
        &self.attempt_ledger
    }
}

impl AccountAttemptRepositoryProvider for SqliteRepositoryProvider {
    type AccountAttemptRepo = SqliteAccountAttemptRepository;

    fn account_attempts(&self) -> &Self::AccountAttemptRepo {
        &self.account_attempts
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(())
    }
}

pub(crate) fn from_unix(seconds: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| invalid_timestamp(seconds))
}

pub(crate) fn from_unix_opt(seconds: Option<i64>) -> Result<Option<DateTime<Utc>>, Error> {
    seconds.map(from_unix).transpose()
}

pub(crate) fn from_unix_millis(millis: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| invalid_timestamp(millis))
}

fn invalid_timestamp(value: i64) -> Error {
    Error::Storage(StorageError::Database(format!("Invalid timestamp: {value}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// A migrated in-memory database. One connection, so every query sees the same database.
    pub(crate) async fn setup_pool() -> SqlitePool {
        let _ = tracing_subscriber::fmt().try_init();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");
        SqliteRepositoryProvider::new(pool.clone())
            .migrate()
            .await
            .expect("Failed to migrate");
        pool
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = setup_pool().await;
        let provider = SqliteRepositoryProvider::new(pool);
        provider.migrate().await.unwrap();
        provider.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_removes_schema() {
        let pool = setup_pool().await;
        let provider = SqliteRepositoryProvider::new(pool.clone());
        provider.rollback().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'sessions', 'login_throttle')",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn test_timestamp_conversion() {
        assert_eq!(from_unix(0).unwrap().timestamp(), 0);
        assert_eq!(from_unix_millis(1_500).unwrap().timestamp_millis(), 1_500);
        assert!(from_unix_opt(None).unwrap().is_none());
        assert!(from_unix(i64::MAX).is_err());
    }
}
