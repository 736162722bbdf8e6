//! Repository trait for the attempt columns on user accounts.
//!
//! The throttle ledger is the authority for lockouts. These columns mirror it onto the
//! user row for auditing and admin tooling, and are written best-effort.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, storage::AccountAttemptFields};

#[async_trait]
pub trait AccountAttemptRepository: Send + Sync + 'static {
    /// Increment `login_attempts` and set `last_login_attempt` for the account with this email.
    ///
    /// A no-op for unknown emails so callers cannot discover accounts.
    async fn record_login_attempt(&self, email: &str, at: DateTime<Utc>) -> Result<(), Error>;

    /// Reset `login_attempts` to zero. `last_login_attempt` is kept.
    async fn reset_login_attempts(&self, email: &str) -> Result<(), Error>;

    /// Read the attempt columns, `None` for unknown emails.
    async fn get_login_attempts(&self, email: &str)
    -> Result<Option<AccountAttemptFields>, Error>;
}
