//! SQLite storage backend for portcullis
//!
//! Provides [`SqliteRepositoryProvider`], which implements every repository trait from
//! `portcullis-core` on top of a single [`sqlx::SqlitePool`], plus the schema migrations
//! in [`migrations`].
//!
//! ```rust,ignore
//! use portcullis_storage_sqlite::SqliteRepositoryProvider;
//!
//! let provider = SqliteRepositoryProvider::connect("sqlite://portcullis.db?mode=rwc").await?;
//! provider.migrate().await?;
//! ```
pub mod migrations;
pub mod repositories;

use std::str::FromStr;

use portcullis_core::{Error, error::StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use repositories::{
    SqliteAccountAttemptRepository, SqliteAttemptLedger, SqliteRepositoryProvider,
    SqliteSessionRepository, SqliteUserRepository,
};

impl SqliteRepositoryProvider {
    /// Open a pool for `database_url`, creating the database file when missing.
    ///
    /// In-memory databases are limited to one connection since each connection would
    /// otherwise see its own empty database.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Storage(StorageError::Connection(e.to_string())))?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new();
        if database_url.contains(":memory:") {
            pool_options = pool_options.max_connections(1);
        }

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            Error::Storage(StorageError::Connection(e.to_string()))
        })?;

        Ok(Self::new(pool))
    }
}
