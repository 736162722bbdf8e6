//! Repository trait for the login attempt ledger.
//!
//! The ledger keeps one [`AttemptRecord`] per [`ThrottleKey`]. Callers pass in the current
//! time and the decay window so every backend applies the same expiry rule: a record whose
//! last failure is at least one window old counts as absent.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{Error, storage::AttemptRecord, throttle::ThrottleKey};

/// Failed-attempt counts keyed by throttle key.
///
/// # Consistency
///
/// `record_failure` must be atomic per key: N concurrent calls on the same key leave a count
/// of exactly N (absent decay). No other ordering guarantees are required.
#[async_trait]
pub trait AttemptLedger: Send + Sync + 'static {
    /// Record one failure at `now` and return the updated record.
    ///
    /// Creates the record if absent. If the existing record has decayed the count restarts
    /// at 1 with `first_failure_at = now`.
    async fn record_failure(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error>;

    /// Remove the record for `key`. Idempotent.
    async fn clear(&self, key: &ThrottleKey) -> Result<(), Error>;

    /// Read the record for `key` with decay applied. Returns a zero record when absent.
    async fn snapshot(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error>;

    /// Delete records whose last failure is before `before`, returning the number removed.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
