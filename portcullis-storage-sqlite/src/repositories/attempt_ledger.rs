//! SQLite implementation of the login attempt ledger.
//!
//! Each throttle key owns one row in `login_throttle`. A failure is recorded with a single
//! upsert that restarts the count when the previous failure has decayed, so concurrent
//! failures on one key never lose an increment.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use portcullis_core::{
    Error, error::utilities::DatabaseResultExt, repositories::AttemptLedger,
    storage::AttemptRecord, throttle::ThrottleKey,
};
use sqlx::SqlitePool;

use super::from_unix_millis;

pub struct SqliteAttemptLedger {
    pool: SqlitePool,
}

impl SqliteAttemptLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteAttemptRecord {
    throttle_key: String,
    failed_count: i64,
    first_failure_at: i64,
    last_failure_at: i64,
}

impl TryFrom<SqliteAttemptRecord> for AttemptRecord {
    type Error = Error;

    fn try_from(row: SqliteAttemptRecord) -> Result<Self, Self::Error> {
        Ok(AttemptRecord {
            key: ThrottleKey::from_raw(row.throttle_key),
            failed_count: u32::try_from(row.failed_count).unwrap_or(u32::MAX),
            first_failure_at: Some(from_unix_millis(row.first_failure_at)?),
            last_failure_at: Some(from_unix_millis(row.last_failure_at)?),
        })
    }
}

#[async_trait]
impl AttemptLedger for SqliteAttemptLedger {
    async fn record_failure(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error> {
        let now_ms = now.timestamp_millis();
        let cutoff_ms = now
            .checked_sub_signed(decay)
            .map_or(i64::MIN, |cutoff| cutoff.timestamp_millis());

        let row = sqlx::query_as::<_, SqliteAttemptRecord>(
            r#"
            INSERT INTO login_throttle (throttle_key, failed_count, first_failure_at, last_failure_at)
            VALUES (?1, 1, ?2, ?2)
            ON CONFLICT(throttle_key) DO UPDATE SET
                failed_count = CASE
                    WHEN login_throttle.last_failure_at <= ?3 THEN 1
                    ELSE login_throttle.failed_count + 1
                END,
                first_failure_at = CASE
                    WHEN login_throttle.last_failure_at <= ?3 THEN excluded.first_failure_at
                    ELSE login_throttle.first_failure_at
                END,
                last_failure_at = excluded.last_failure_at
            RETURNING throttle_key, failed_count, first_failure_at, last_failure_at
            "#,
        )
        .bind(key.as_str())
        .bind(now_ms)
        .bind(cutoff_ms)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to record failed login attempt")?;

        row.try_into()
    }

    async fn clear(&self, key: &ThrottleKey) -> Result<(), Error> {
        sqlx::query("DELETE FROM login_throttle WHERE throttle_key = ?1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to clear attempts")?;

        Ok(())
    }

    async fn snapshot(
        &self,
        key: &ThrottleKey,
        now: DateTime<Utc>,
        decay: Duration,
    ) -> Result<AttemptRecord, Error> {
        let row = sqlx::query_as::<_, SqliteAttemptRecord>(
            r#"
            SELECT throttle_key, failed_count, first_failure_at, last_failure_at
            FROM login_throttle
            WHERE throttle_key = ?1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to read attempts")?;

        match row {
            Some(row) => Ok(AttemptRecord::try_from(row)?.decayed(now, decay)),
            None => Ok(AttemptRecord::empty(key.clone())),
        }
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM login_throttle WHERE last_failure_at < ?1")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to purge expired attempts")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::tests::setup_pool;
    use std::sync::Arc;

    fn key() -> ThrottleKey {
        ThrottleKey::new("alice@example.com", Some("10.0.0.1"))
    }

    fn decay() -> Duration {
        Duration::seconds(30)
    }

    #[tokio::test]
    async fn test_record_failure_increments() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let now = Utc::now();

        let first = ledger.record_failure(&key(), now, decay()).await.unwrap();
        assert_eq!(first.failed_count, 1);

        let later = now + Duration::seconds(5);
        let second = ledger.record_failure(&key(), later, decay()).await.unwrap();
        assert_eq!(second.failed_count, 2);
        assert_eq!(
            second.first_failure_at.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
        assert_eq!(
            second.last_failure_at.map(|t| t.timestamp_millis()),
            Some(later.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_record_failure_restarts_after_decay() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let now = Utc::now();
        for _ in 0..3 {
            ledger.record_failure(&key(), now, decay()).await.unwrap();
        }

        let record = ledger
            .record_failure(&key(), now + decay(), decay())
            .await
            .unwrap();
        assert_eq!(record.failed_count, 1);
        assert_eq!(
            record.first_failure_at.map(|t| t.timestamp_millis()),
            Some((now + decay()).timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_snapshot_applies_decay() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let now = Utc::now();
        ledger.record_failure(&key(), now, decay()).await.unwrap();

        let live = ledger
            .snapshot(&key(), now + Duration::milliseconds(29_999), decay())
            .await
            .unwrap();
        assert_eq!(live.failed_count, 1);

        let expired = ledger.snapshot(&key(), now + decay(), decay()).await.unwrap();
        assert_eq!(expired, AttemptRecord::empty(key()));
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_key_is_empty() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let record = ledger.snapshot(&key(), Utc::now(), decay()).await.unwrap();
        assert_eq!(record, AttemptRecord::empty(key()));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let now = Utc::now();
        let other = ThrottleKey::new("alice@example.com", Some("10.0.0.2"));

        ledger.record_failure(&key(), now, decay()).await.unwrap();
        ledger.record_failure(&key(), now, decay()).await.unwrap();
        ledger.record_failure(&other, now, decay()).await.unwrap();

        assert_eq!(ledger.snapshot(&key(), now, decay()).await.unwrap().failed_count, 2);
        assert_eq!(ledger.snapshot(&other, now, decay()).await.unwrap().failed_count, 1);
    }

    #[tokio::test]
    async fn test_unbounded_window_keeps_counting() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let now = Utc::now();

        ledger.record_failure(&key(), now, Duration::MAX).await.unwrap();
        let record = ledger.record_failure(&key(), now, Duration::MAX).await.unwrap();
        assert_eq!(record.failed_count, 2);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let now = Utc::now();
        ledger.record_failure(&key(), now, decay()).await.unwrap();

        ledger.clear(&key()).await.unwrap();
        ledger.clear(&key()).await.unwrap();
        assert_eq!(ledger.snapshot(&key(), now, decay()).await.unwrap().failed_count, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let ledger = SqliteAttemptLedger::new(setup_pool().await);
        let now = Utc::now();
        let other = ThrottleKey::new("bob@example.com", None);

        ledger
            .record_failure(&key(), now - Duration::hours(2), decay())
            .await
            .unwrap();
        ledger.record_failure(&other, now, decay()).await.unwrap();

        let removed = ledger.purge_expired(now - Duration::hours(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(ledger.snapshot(&other, now, decay()).await.unwrap().failed_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_all_counted() {
        let ledger = Arc::new(SqliteAttemptLedger::new(setup_pool().await));
        let now = Utc::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record_failure(&key(), now, decay()).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = ledger.snapshot(&key(), now, decay()).await.unwrap();
        assert_eq!(record.failed_count, 16);
    }
}
