//! Versioned schema migrations
//!
//! Each storage backend defines its schema as a list of [`Migration`]s and applies them with
//! a [`MigrationManager`]. Every migration is reversible: `down` must undo exactly what `up`
//! did, so a backend can be rolled back one step at a time.

use async_trait::async_trait;
use sqlx::Database;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    /// Execute the migration
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Rollback the migration
    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique version number for ordering migrations
    fn version(&self) -> i64;

    /// Human readable name of the migration
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: i64, // unix timestamp since no database can agree on a datetime type
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    fn get_migration_table_name(&self) -> &str {
        "_portcullis_migrations"
    }

    /// Initialize migration tracking table
    async fn initialize(&self) -> Result<()>;

    /// Apply pending migrations, lowest version first
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Roll back applied migrations, highest version first
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Get list of applied migrations
    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    /// Check if specific migration was applied
    async fn is_applied(&self, version: i64) -> Result<bool>;
}

/// Order migrations by version, ascending for `up` and descending for `down`.
///
/// Fails if two migrations share a version.
pub fn ordered<DB: Database>(
    migrations: &[Box<dyn Migration<DB>>],
    descending: bool,
) -> Result<Vec<&dyn Migration<DB>>> {
    let mut sorted: Vec<&dyn Migration<DB>> = migrations.iter().map(|m| m.as_ref()).collect();
    sorted.sort_by_key(|m| m.version());

    if let Some(pair) = sorted.windows(2).find(|w| w[0].version() == w[1].version()) {
        return Err(MigrationError::Migration(format!(
            "duplicate migration version {} ({} and {})",
            pair[0].version(),
            pair[0].name(),
            pair[1].name()
        )));
    }

    if descending {
        sorted.reverse();
    }
    Ok(sorted)
}
