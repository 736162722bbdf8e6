//! Rate limiting over the attempt ledger.
//!
//! [`RateLimiter`] answers two questions for a throttle key: is it locked out, and how long
//! until it is not. Both are derived from a single ledger snapshot by [`RateLimiter::decision`]
//! so they cannot disagree with each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_core::services::RateLimiter;
//!
//! let limiter = RateLimiter::new(ledger);
//! let decision = limiter.decision(&key, 3, Duration::seconds(30)).await?;
//! if decision.locked {
//!     // refuse with decision.retry_after_seconds
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    Error,
    clock::{Clock, SystemClock},
    repositories::AttemptLedger,
    storage::AttemptRecord,
    throttle::ThrottleKey,
};

/// Lockout state of a throttle key at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutDecision {
    pub locked: bool,
    /// Failures currently counting against the key
    pub failed_attempts: u32,
    /// Whole seconds until the key unlocks. Zero when unlocked, at least one when locked.
    pub retry_after_seconds: u64,
}

impl LockoutDecision {
    pub fn unlocked() -> Self {
        Self {
            locked: false,
            failed_attempts: 0,
            retry_after_seconds: 0,
        }
    }

    /// A lockout for a full window, used when the ledger cannot be read and the policy is to
    /// fail closed.
    pub fn locked_for(window: Duration) -> Self {
        Self {
            locked: true,
            failed_attempts: 0,
            retry_after_seconds: ceil_seconds(window).max(1),
        }
    }

    /// Evaluate an already-decayed record.
    pub fn evaluate(
        record: &AttemptRecord,
        max_attempts: u32,
        decay: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let retry_after_seconds = seconds_until_decay(record, decay, now);
        let locked = record.failed_count >= max_attempts && retry_after_seconds > 0;
        Self {
            locked,
            failed_attempts: record.failed_count,
            retry_after_seconds: if locked { retry_after_seconds } else { 0 },
        }
    }
}

/// Seconds until `record` decays, rounded up. Zero once the window has fully elapsed.
pub fn seconds_until_decay(record: &AttemptRecord, decay: Duration, now: DateTime<Utc>) -> u64 {
    let Some(last) = record.last_failure_at else {
        return 0;
    };
    let until = last
        .checked_add_signed(decay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let remaining = until.signed_duration_since(now);
    if remaining <= Duration::zero() {
        0
    } else {
        ceil_seconds(remaining)
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    let whole = duration.num_seconds();
    let rounded = if duration > Duration::seconds(whole) {
        whole + 1
    } else {
        whole
    };
    rounded.max(0) as u64
}

pub struct RateLimiter<L: AttemptLedger + ?Sized> {
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
}

impl<L: AttemptLedger + ?Sized> RateLimiter<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self::with_clock(ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(ledger: Arc<L>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether `key` has at least `max_attempts` failures that have not yet decayed.
    pub async fn too_many_attempts(
        &self,
        key: &ThrottleKey,
        max_attempts: u32,
        decay: Duration,
    ) -> Result<bool, Error> {
        Ok(self.decision(key, max_attempts, decay).await?.locked)
    }

    /// Seconds until the most recent failure for `key` decays.
    pub async fn available_in(&self, key: &ThrottleKey, decay: Duration) -> Result<u64, Error> {
        let now = self.clock.now();
        let record = self.ledger.snapshot(key, now, decay).await?;
        Ok(seconds_until_decay(&record, decay, now))
    }

    /// Lockout state and retry delay computed from one snapshot.
    pub async fn decision(
        &self,
        key: &ThrottleKey,
        max_attempts: u32,
        decay: Duration,
    ) -> Result<LockoutDecision, Error> {
        let now = self.clock.now();
        let record = self.ledger.snapshot(key, now, decay).await?;
        Ok(LockoutDecision::evaluate(&record, max_attempts, decay, now))
    }

    /// Record a failure against `key`.
    pub async fn hit(&self, key: &ThrottleKey, decay: Duration) -> Result<AttemptRecord, Error> {
        let record = self
            .ledger
            .record_failure(key, self.clock.now(), decay)
            .await?;
        tracing::debug!(key = %key, failed_count = record.failed_count, "Recorded failed attempt");
        Ok(record)
    }

    pub async fn clear(&self, key: &ThrottleKey) -> Result<(), Error> {
        self.ledger.clear(key).await
    }

    /// Drop ledger records whose last failure is older than `retention`.
    pub async fn purge_expired(&self, retention: Duration) -> Result<u64, Error> {
        self.ledger
            .purge_expired(
                self.clock
                    .now()
                    .checked_sub_signed(retention)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            )
            .await
    }
}
