//! Plain data exchanged between services and storage backends.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, UserId, error::ValidationError, throttle::ThrottleKey};

/// Failed-attempt bookkeeping for one throttle key.
///
/// A record with `failed_count == 0` carries no timestamps; it is what the ledger returns
/// for keys it has never seen or whose window has decayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub key: ThrottleKey,
    pub failed_count: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    pub fn empty(key: ThrottleKey) -> Self {
        Self {
            key,
            failed_count: 0,
            first_failure_at: None,
            last_failure_at: None,
        }
    }

    /// A record holding a single failure at `at`.
    pub fn first_failure(key: ThrottleKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            failed_count: 1,
            first_failure_at: Some(at),
            last_failure_at: Some(at),
        }
    }

    /// Whether the record no longer counts at `now` for a window of `decay`.
    pub fn is_expired(&self, now: DateTime<Utc>, decay: Duration) -> bool {
        self.last_failure_at
            .is_none_or(|last| now.signed_duration_since(last) >= decay)
    }

    /// Apply decay: returns an empty record for the same key when expired.
    pub fn decayed(self, now: DateTime<Utc>, decay: Duration) -> Self {
        if self.is_expired(now, decay) {
            Self::empty(self.key)
        } else {
            self
        }
    }

    /// Fold one more failure at `now` into this record, restarting it when it had decayed.
    pub fn with_failure(self, now: DateTime<Utc>, decay: Duration) -> Self {
        if self.is_expired(now, decay) {
            return Self::first_failure(self.key, now);
        }
        Self {
            failed_count: self.failed_count.saturating_add(1),
            last_failure_at: Some(now),
            ..self
        }
    }
}

/// The password hash stored for an identifier.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub user_id: UserId,
    pub password_hash: String,
}

/// Attempt-tracking columns mirrored on the user account row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAttemptFields {
    pub login_attempts: i64,
    pub last_login_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    /// Argon2 PHC string; see [`crate::credentials::hash_password`].
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl NewUser {
    pub fn builder() -> NewUserBuilder {
        NewUserBuilder::default()
    }
}

#[derive(Default)]
pub struct NewUserBuilder {
    id: Option<UserId>,
    email: Option<String>,
    name: Option<String>,
    password_hash: Option<String>,
}

impl NewUserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn password_hash(mut self, password_hash: impl Into<String>) -> Self {
        self.password_hash = Some(password_hash.into());
        self
    }

    pub fn build(self) -> Result<NewUser, Error> {
        Ok(NewUser {
            id: self.id.unwrap_or_default(),
            email: self.email.ok_or(ValidationError::MissingField(
                "Email is required".to_string(),
            ))?,
            name: self.name,
            password_hash: self.password_hash.ok_or(ValidationError::MissingField(
                "Password hash is required".to_string(),
            ))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ThrottleKey {
        ThrottleKey::new("alice@example.com", Some("127.0.0.1"))
    }

    #[test]
    fn test_empty_record_is_expired() {
        let record = AttemptRecord::empty(key());
        assert!(record.is_expired(Utc::now(), Duration::seconds(30)));
    }

    #[test]
    fn test_with_failure_increments_inside_window() {
        let now = Utc::now();
        let decay = Duration::seconds(30);

        let record = AttemptRecord::empty(key())
            .with_failure(now, decay)
            .with_failure(now + Duration::seconds(5), decay);

        assert_eq!(record.failed_count, 2);
        assert_eq!(record.first_failure_at, Some(now));
        assert_eq!(record.last_failure_at, Some(now + Duration::seconds(5)));
    }

    #[test]
    fn test_with_failure_restarts_after_decay() {
        let now = Utc::now();
        let decay = Duration::seconds(30);

        let record = AttemptRecord::empty(key())
            .with_failure(now, decay)
            .with_failure(now, decay)
            .with_failure(now + Duration::seconds(30), decay);

        assert_eq!(record.failed_count, 1);
        assert_eq!(record.first_failure_at, Some(now + Duration::seconds(30)));
    }

    #[test]
    fn test_decayed_boundary() {
        let now = Utc::now();
        let decay = Duration::seconds(30);
        let record = AttemptRecord::first_failure(key(), now);

        let still_live = record.clone().decayed(now + Duration::milliseconds(29_999), decay);
        assert_eq!(still_live.failed_count, 1);

        let gone = record.decayed(now + decay, decay);
        assert_eq!(gone.failed_count, 0);
        assert!(gone.last_failure_at.is_none());
    }

    #[test]
    fn test_new_user_builder_requires_hash() {
        let result = NewUser::builder().email("alice@example.com").build();
        assert!(result.is_err());

        let user = NewUser::builder()
            .email("alice@example.com")
            .password_hash("$argon2id$stub")
            .build()
            .unwrap();
        assert!(user.id.is_valid());
    }
}
