//! In-memory attempt ledger for single-node deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::{Error, storage::AttemptRecord, throttle::ThrottleKey};

use super::AttemptLedger;

/// [`AttemptLedger`] backed by a [`DashMap`].
///
/// Updates go through the map's entry API, which holds the shard lock for the key while the
/// record is rewritten, so concurrent failures on one key are never lost.
#[derive(Debug, Default)]
pub struct InMemoryAttemptLedger {
    records: DashMap<ThrottleKey, AttemptRecord>,
}

impl InMemoryAttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked, decayed or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AttemptLedger for InMemoryAttemptLedger {
    async fn record_failure(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error> {
        let mut entry = self
            .records
            .entry(key.clone())
            .or_insert_with(|| AttemptRecord::empty(key.clone()));
        let updated = entry.clone().with_failure(now, decay);
        *entry = updated.clone();
        Ok(updated)
    }

    async fn clear(&self, key: &ThrottleKey) -> Result<(), Error> {
        self.records.remove(key);
        Ok(())
    }

    async fn snapshot(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error> {
        Ok(self
            .records
            .get(key)
            .map(|record| record.clone().decayed(now, decay))
            .unwrap_or_else(|| AttemptRecord::empty(key.clone())))
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut removed = 0u64;
        self.records.retain(|_, record| {
            let keep = record.last_failure_at.is_some_and(|last| last >= before);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
