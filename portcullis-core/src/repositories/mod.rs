//! Repository traits for data access layer
//!
//! This module defines the repository interfaces that services use to interact with storage.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits (and [`AttemptLedger`]) define the operations for each
//!   data domain
//! - Individual `*RepositoryProvider` traits provide access to each repository type
//! - [`RepositoryProvider`] is a supertrait combining all provider traits plus lifecycle methods
//!
//! Services hold `Arc`s of individual repositories; the adapters in [`adapter`] turn a shared
//! provider into those.

pub mod account_attempts;
pub mod adapter;
pub mod attempt_ledger;
pub mod memory;
pub mod session;
pub mod user;

pub use account_attempts::AccountAttemptRepository;
pub use adapter::{
    AccountAttemptRepositoryAdapter, AttemptLedgerAdapter, SessionRepositoryAdapter,
    UserRepositoryAdapter,
};
pub use attempt_ledger::AttemptLedger;
pub use memory::InMemoryAttemptLedger;
pub use session::SessionRepository;
pub use user::UserRepository;

use async_trait::async_trait;

use crate::Error;

// ============================================================================
// Individual Repository Provider Traits
// ============================================================================

/// Provider trait for user repository access.
pub trait UserRepositoryProvider: Send + Sync + 'static {
    type UserRepo: UserRepository;

    fn user(&self) -> &Self::UserRepo;
}

/// Provider trait for session repository access.
pub trait SessionRepositoryProvider: Send + Sync + 'static {
    type SessionRepo: SessionRepository;

    fn session(&self) -> &Self::SessionRepo;
}

/// Provider trait for attempt ledger access.
pub trait AttemptLedgerProvider: Send + Sync + 'static {
    type Ledger: AttemptLedger;

    fn attempt_ledger(&self) -> &Self::Ledger;
}

/// Provider trait for the account attempt columns.
pub trait AccountAttemptRepositoryProvider: Send + Sync + 'static {
    type AccountAttemptRepo: AccountAttemptRepository;

    fn account_attempts(&self) -> &Self::AccountAttemptRepo;
}

// ============================================================================
// Unified Repository Provider Trait
// ============================================================================

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Example
///
/// ```rust,ignore
/// use portcullis_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl UserRepositoryProvider for MyStorage {
///     type UserRepo = MyUserRepository;
///     fn user(&self) -> &Self::UserRepo { &self.user_repo }
/// }
///
/// // ... implement other provider traits ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider:
    UserRepositoryProvider
    + SessionRepositoryProvider
    + AttemptLedgerProvider
    + AccountAttemptRepositoryProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
