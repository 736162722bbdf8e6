//! Builder pattern for constructing Portcullis instances
//!
//! This module provides a type-safe builder for creating [`Portcullis`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use portcullis::PortcullisBuilder;
//! use portcullis::captcha::StaticCaptchaVerifier;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_captcha(Arc::new(StaticCaptchaVerifier::accept_all()))
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Duration;
use portcullis_core::RepositoryProvider;

use crate::{
    CaptchaVerifier, EventBus, LedgerFailurePolicy, LockoutPolicy, LoginConfig, Portcullis,
};

/// Errors that can occur when building a Portcullis instance.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`PortcullisBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

/// A type-safe builder for constructing [`Portcullis`] instances.
///
/// Storage must be configured before [`build`](PortcullisBuilder::build) becomes available.
/// A CAPTCHA verifier is required at build time.
pub struct PortcullisBuilder<Storage> {
    storage: Storage,
    config: LoginConfig,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
    events: Option<EventBus>,
    apply_migrations: bool,
}

impl Default for PortcullisBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl PortcullisBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Lockout: 3 attempts per 30 second window, lockout reinforced by further attempts
    /// - Ledger failures: fail closed
    /// - Home destination: `/dashboard`
    /// - Session lifetime: 30 days
    /// - Apply migrations: false
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: LoginConfig::default(),
            captcha: None,
            events: None,
            apply_migrations: false,
        }
    }

    /// Use an already constructed repository provider.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> PortcullisBuilder<WithStorage<R>> {
        PortcullisBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            captcha: self.captcha,
            events: self.events,
            apply_migrations: self.apply_migrations,
        }
    }
}

#[cfg(feature = "sqlite")]
impl PortcullisBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        PortcullisBuilder<WithStorage<crate::SqliteRepositoryProvider>>,
        PortcullisBuilderError,
    > {
        let repositories = crate::SqliteRepositoryProvider::connect(url)
            .await
            .map_err(|e| PortcullisBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(repositories)))
    }

    /// Configure SQLite storage with an existing connection pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> PortcullisBuilder<WithStorage<crate::SqliteRepositoryProvider>> {
        self.with_repositories(Arc::new(crate::SqliteRepositoryProvider::new(pool)))
    }
}

impl<R: RepositoryProvider> PortcullisBuilder<WithStorage<R>> {
    /// Set the CAPTCHA verifier consulted on every login.
    pub fn with_captcha(mut self, captcha: Arc<dyn CaptchaVerifier>) -> Self {
        self.captcha = Some(captcha);
        self
    }

    /// Replace the whole login configuration.
    pub fn with_login_config(mut self, config: LoginConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the lockout policy.
    ///
    /// Default: 3 attempts, 30 second decay window
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use portcullis::{LockoutPolicy, PortcullisBuilder};
    /// use chrono::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let builder = PortcullisBuilder::new()
    ///     .with_sqlite("sqlite::memory:")
    ///     .await?
    ///     .with_lockout_policy(LockoutPolicy::new(5, Duration::minutes(1)));
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.config = self.config.with_lockout(policy);
        self
    }

    /// Choose what happens when the attempt ledger cannot be read.
    ///
    /// Default: [`LedgerFailurePolicy::FailClosed`]
    pub fn with_ledger_failure_policy(mut self, policy: LedgerFailurePolicy) -> Self {
        self.config = self.config.with_ledger_failure(policy);
        self
    }

    /// Where to send users after login when they had no intended destination.
    pub fn with_home_destination(mut self, destination: impl Into<String>) -> Self {
        self.config = self.config.with_home_destination(destination);
        self
    }

    /// Set the session expiration duration.
    ///
    /// Default: 30 days
    pub fn with_session_expiry(mut self, duration: Duration) -> Self {
        self.config = self.config.with_session_lifetime(duration);
        self
    }

    /// Publish login events on an existing bus.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Set whether to automatically apply database migrations during build.
    ///
    /// Default: false
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    /// Build the Portcullis instance.
    ///
    /// Runs migrations first when `apply_migrations(true)` was called.
    pub async fn build(self) -> Result<Portcullis<R>, PortcullisBuilderError> {
        let captcha = self.captcha.ok_or_else(|| {
            PortcullisBuilderError::InvalidConfiguration(
                "a CAPTCHA verifier is required".to_string(),
            )
        })?;

        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| PortcullisBuilderError::Migration(e.to_string()))?;
        }

        let portcullis = Portcullis::new(self.storage.repositories, captcha, self.config)
            .map_err(|e| PortcullisBuilderError::InvalidConfiguration(e.to_string()))?;

        Ok(match self.events {
            Some(events) => portcullis.with_event_bus(events),
            None => portcullis,
        })
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use portcullis_core::captcha::StaticCaptchaVerifier;

    fn setup_test() {
        let _ = tracing_subscriber::fmt().try_init();
    }

    #[tokio::test]
    async fn test_builder_with_sqlite_and_migrations() {
        setup_test();

        let portcullis = PortcullisBuilder::new()
            .with_sqlite("sqlite::memory:")
            .await
            .unwrap()
            .with_captcha(Arc::new(StaticCaptchaVerifier::accept_all()))
            .apply_migrations(true)
            .build()
            .await
            .unwrap();

        portcullis.health_check().await.unwrap();
        assert_eq!(portcullis.config().lockout.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_builder_requires_captcha() {
        setup_test();

        let result = PortcullisBuilder::new()
            .with_sqlite("sqlite::memory:")
            .await
            .unwrap()
            .build()
            .await;

        assert!(matches!(
            result,
            Err(PortcullisBuilderError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_policy() {
        setup_test();

        let result = PortcullisBuilder::new()
            .with_sqlite("sqlite::memory:")
            .await
            .unwrap()
            .with_captcha(Arc::new(StaticCaptchaVerifier::accept_all()))
            .with_lockout_policy(LockoutPolicy::new(0, Duration::seconds(30)))
            .build()
            .await;

        assert!(matches!(
            result,
            Err(PortcullisBuilderError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_builder_configuration_is_applied() {
        setup_test();

        let portcullis = PortcullisBuilder::new()
            .with_sqlite("sqlite::memory:")
            .await
            .unwrap()
            .with_captcha(Arc::new(StaticCaptchaVerifier::accept_all()))
            .with_lockout_policy(LockoutPolicy::new(5, Duration::minutes(1)))
            .with_ledger_failure_policy(LedgerFailurePolicy::FailOpen)
            .with_home_destination("/home")
            .with_session_expiry(Duration::days(7))
            .build()
            .await
            .unwrap();

        let config = portcullis.config();
        assert_eq!(config.lockout.max_attempts, 5);
        assert_eq!(config.lockout.decay_window, Duration::minutes(1));
        assert_eq!(config.ledger_failure, LedgerFailurePolicy::FailOpen);
        assert_eq!(config.home_destination, "/home");
        assert_eq!(config.session_lifetime, Duration::days(7));
    }
}
