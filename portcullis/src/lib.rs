//! # Portcullis
//!
//! Portcullis is a password login flow that defends itself against brute-force attempts.
//! Every attempt is scoped to a throttle key (the normalized login identifier plus the client
//! address); once a key has collected too many failures inside the decay window, further
//! attempts are refused before credentials are ever checked.
//!
//! The [`Portcullis`] coordinator wires a storage backend, a CAPTCHA verifier and a
//! [`LoginConfig`] into a [`LoginService`](portcullis_core::LoginService) and adds session
//! lookup, logout and background cleanup on top.
//!
//! ## Storage Support
//!
//! - SQLite (the `sqlite` feature, enabled by default)
//!
//! Other backends implement [`RepositoryProvider`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use portcullis::{ClientInfo, LoginContext, LoginOutcome, LoginRequest, PortcullisBuilder};
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
//!     let request = LoginRequest::new("alice@example.com", "hunter22", Some("token".into()));
//!     let context = LoginContext::new(ClientInfo::new(Some("127.0.0.1".into()), None));
//!
//!     match portcullis.login(request, context).await? {
//!         LoginOutcome::SessionEstablished { redirect_target, .. } => {
//!             println!("redirect to {redirect_target}");
//!         }
//!         other => println!("login refused: {other:?}"),
//!     }
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use chrono::Duration;
use portcullis_core::{
    Error, LoginService, RepositoryProvider,
    clock::{Clock, SystemClock},
    error::SessionError,
    repositories::{
        AccountAttemptRepositoryAdapter, AttemptLedgerAdapter, SessionRepositoryAdapter,
        UserRepositoryAdapter,
    },
    services::RateLimiter,
    session::OpaqueSessionManager,
};

pub mod builder;

pub use builder::{NoStorage, PortcullisBuilder, PortcullisBuilderError, WithStorage};

/// Re-export core types from portcullis_core
///
/// These types are commonly used when working with the Portcullis API.
pub use portcullis_core::{
    AttemptLedger, CaptchaVerifier, ClientInfo, Event, EventBus, EventHandler, FieldErrors,
    LedgerFailurePolicy, LockoutDecision, LockoutPolicy, LoginConfig, LoginContext, LoginOutcome,
    LoginRequest, ManualClock, OldInput, Session, SessionManager, SessionToken, ThrottleKey, User,
    UserId, captcha, storage::NewUser,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use portcullis_storage_sqlite::SqliteRepositoryProvider;

/// How often the background task purges decayed throttle records and expired sessions.
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Errors that can occur when using Portcullis.
///
/// Login refusals (lockouts, bad credentials, invalid input) are not errors; they come back as
/// a [`LoginOutcome`]. These are the failures an outcome cannot absorb.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisError {
    /// Error during authentication
    #[error("Auth error: {0}")]
    AuthError(String),
    /// The session is unknown, expired or malformed
    #[error("Session error: {0}")]
    SessionError(String),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
    /// The configuration was rejected
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// An event handler failed
    #[error("Event error: {0}")]
    EventError(String),
}

impl From<Error> for PortcullisError {
    fn from(error: Error) -> Self {
        match error {
            Error::Auth(e) => PortcullisError::AuthError(e.to_string()),
            Error::Session(e) => PortcullisError::SessionError(e.to_string()),
            Error::Validation(e) => PortcullisError::ConfigurationError(e.to_string()),
            Error::Storage(e) => PortcullisError::StorageError(e.to_string()),
            Error::Event(e) => PortcullisError::EventError(e.to_string()),
        }
    }
}

impl PortcullisError {
    /// Whether the caller simply has no valid session, as opposed to an infrastructure failure.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, PortcullisError::SessionError(_))
    }
}

/// The login coordinator.
///
/// `Portcullis` owns one [`LoginService`] built over a [`RepositoryProvider`]: the provider's
/// attempt ledger backs the rate limiter, its user repository backs password verification and
/// its session repository backs opaque sessions. The attempt columns on user rows are kept in
/// sync as an audit mirror.
///
/// # Example
///
/// ```rust,no_run
/// use portcullis::{LoginConfig, Portcullis, SqliteRepositoryProvider};
/// use portcullis::captcha::StaticCaptchaVerifier;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let repositories = Arc::new(SqliteRepositoryProvider::connect("sqlite::memory:").await?);
///     let portcullis = Portcullis::new(
///         repositories,
///         Arc::new(StaticCaptchaVerifier::accept_all()),
///         LoginConfig::default(),
///     )?;
///     portcullis.migrate().await?;
///     Ok(())
/// }
/// ```
pub struct Portcullis<R: RepositoryProvider> {
    repositories: Arc<R>,
    captcha: Arc<dyn CaptchaVerifier>,
    login_service: Arc<LoginService>,
    sessions: Arc<dyn SessionManager>,
    users: Arc<UserRepositoryAdapter<R>>,
    ledger: Arc<dyn AttemptLedger>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: LoginConfig,
}

impl<R: RepositoryProvider> Portcullis<R> {
    /// Create a new Portcullis instance with a repository provider
    ///
    /// Fails if `config` is invalid, e.g. a zero attempt budget or a non-positive decay window.
    pub fn new(
        repositories: Arc<R>,
        captcha: Arc<dyn CaptchaVerifier>,
        config: LoginConfig,
    ) -> Result<Self, PortcullisError> {
        config
            .validate()
            .map_err(|e| PortcullisError::ConfigurationError(e.to_string()))?;

        Ok(Self::assemble(
            repositories,
            captcha,
            config,
            Arc::new(SystemClock),
            EventBus::default(),
        ))
    }

    fn assemble(
        repositories: Arc<R>,
        captcha: Arc<dyn CaptchaVerifier>,
        config: LoginConfig,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        let users = Arc::new(UserRepositoryAdapter::new(repositories.clone()));
        let ledger: Arc<dyn AttemptLedger> =
            Arc::new(AttemptLedgerAdapter::new(repositories.clone()));
        let sessions: Arc<dyn SessionManager> = Arc::new(OpaqueSessionManager::with_clock(
            Arc::new(SessionRepositoryAdapter::new(repositories.clone())),
            clock.clone(),
        ));
        let credentials = Arc::new(portcullis_core::PasswordCredentialVerifier::new(
            users.clone(),
        ));

        let login_service = LoginService::new(
            ledger.clone(),
            credentials,
            sessions.clone(),
            captcha.clone(),
            config.clone(),
        )
        .with_clock(clock.clone())
        .with_event_bus(events.clone())
        .with_account_attempts(Arc::new(AccountAttemptRepositoryAdapter::new(
            repositories.clone(),
        )));

        Self {
            repositories,
            captcha,
            login_service: Arc::new(login_service),
            sessions,
            users,
            ledger,
            events,
            clock,
            config,
        }
    }

    /// Use a different time source for throttling and session expiry.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(self.repositories, self.captcha, self.config, clock, self.events)
    }

    /// Share an existing event bus, e.g. one with handlers already registered.
    pub fn with_event_bus(self, events: EventBus) -> Self {
        Self::assemble(self.repositories, self.captcha, self.config, self.clock, events)
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// The bus login events are published on. Register handlers here to observe lockouts.
    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn repositories(&self) -> &Arc<R> {
        &self.repositories
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), PortcullisError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| PortcullisError::StorageError(e.to_string()))
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), PortcullisError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| PortcullisError::StorageError(e.to_string()))
    }

    /// Attempt a login.
    ///
    /// Refusals are reported through the returned [`LoginOutcome`]; `Err` means the attempt
    /// could not be evaluated at all.
    pub async fn login(
        &self,
        request: LoginRequest,
        context: LoginContext,
    ) -> Result<LoginOutcome, PortcullisError> {
        Ok(self.login_service.login(request, context).await?)
    }

    /// Current lockout state for an identifier and client address.
    pub async fn lockout_status(
        &self,
        identifier: &str,
        ip_address: Option<&str>,
    ) -> Result<LockoutDecision, PortcullisError> {
        let key = ThrottleKey::new(identifier, ip_address);
        let lockout = &self.config.lockout;
        Ok(self
            .login_service
            .rate_limiter()
            .decision(&key, lockout.max_attempts, lockout.decay_window)
            .await?)
    }

    /// Get a user by their ID
    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, PortcullisError> {
        use portcullis_core::repositories::UserRepository;

        self.users
            .find_by_id(user_id)
            .await
            .map_err(|e| PortcullisError::StorageError(e.to_string()))
    }

    /// Get a live session by its token
    ///
    /// Unknown and expired tokens are reported as [`PortcullisError::SessionError`].
    pub async fn get_session(&self, token: &SessionToken) -> Result<Session, PortcullisError> {
        Ok(self.sessions.get_session(token).await?)
    }

    /// End the session identified by `token`.
    ///
    /// Logging out with an unknown or expired token succeeds without doing anything.
    pub async fn logout(&self, token: &SessionToken) -> Result<(), PortcullisError> {
        let session = match self.sessions.get_session(token).await {
            Ok(session) => session,
            Err(Error::Session(SessionError::NotFound | SessionError::Expired)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.sessions.revoke(token).await?;
        tracing::info!(user_id = %session.user_id, "Session revoked");

        let event = Event::SessionRevoked {
            user_id: session.user_id,
            timestamp: self.clock.now(),
        };
        if let Err(e) = self.events.emit(&event).await {
            tracing::warn!(error = %e, "Failed to publish session revocation");
        }
        Ok(())
    }

    /// Revoke every session held by a user.
    pub async fn logout_everywhere(&self, user_id: &UserId) -> Result<(), PortcullisError> {
        Ok(self.sessions.revoke_all_for_user(user_id).await?)
    }

    /// Delete decayed throttle records and expired sessions once.
    ///
    /// Returns the number of throttle records and sessions removed.
    pub async fn cleanup(&self) -> Result<(u64, u64), PortcullisError> {
        let limiter = RateLimiter::with_clock(self.ledger.clone(), self.clock.clone());
        let records = limiter
            .purge_expired(self.config.lockout.decay_window)
            .await?;
        let sessions = self.sessions.cleanup_expired_sessions().await?;
        Ok((records, sessions))
    }

    /// Start the background cleanup task.
    ///
    /// This spawns a task that runs [`Portcullis::cleanup`] hourly until `shutdown` changes.
    /// Decayed records would be ignored anyway; purging only keeps the ledger from growing.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let ledger = self.ledger.clone();
        let sessions = self.sessions.clone();
        let clock = self.clock.clone();
        let retention = self.config.lockout.decay_window;

        tokio::spawn(async move {
            let limiter = RateLimiter::with_clock(ledger, clock);
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        purge(&limiter, sessions.as_ref(), retention).await;
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down login throttle cleanup task");
                        break;
                    }
                }
            }
        })
    }
}

async fn purge(
    limiter: &RateLimiter<dyn AttemptLedger>,
    sessions: &dyn SessionManager,
    retention: Duration,
) {
    match limiter.purge_expired(retention).await {
        Ok(count) if count > 0 => {
            tracing::info!(count = count, "Cleaned up decayed login throttle records");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to clean up login throttle records");
        }
        _ => {}
    }

    match sessions.cleanup_expired_sessions().await {
        Ok(count) if count > 0 => {
            tracing::info!(count = count, "Cleaned up expired sessions");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to clean up expired sessions");
        }
        _ => {}
    }
}

impl<R: RepositoryProvider> Clone for Portcullis<R> {
    fn clone(&self) -> Self {
        Self {
            repositories: self.repositories.clone(),
            captcha: self.captcha.clone(),
            login_service: self.login_service.clone(),
            sessions: self.sessions.clone(),
            users: self.users.clone(),
            ledger: self.ledger.clone(),
            events: self.events.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

