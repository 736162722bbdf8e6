//! Login throttling configuration
//!
//! All knobs are plain data with [`Default`] values matching a conservative interactive
//! login form: three attempts per thirty seconds. The structs deserialize with `serde` so
//! applications can load them from whatever configuration source they already use;
//! durations are expressed as (possibly fractional) seconds.
//!
//! ```rust
//! use portcullis_core::config::{LoginConfig, LockoutPolicy};
//! use chrono::Duration;
//!
//! let config = LoginConfig::default()
//!     .with_lockout(LockoutPolicy::new(5, Duration::minutes(1)))
//!     .with_home_destination("/app");
//! assert!(config.validate().is_ok());
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default number of failures tolerated inside one decay window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default decay window, in seconds.
pub const DEFAULT_DECAY_SECONDS: i64 = 30;

/// Upper bound, in days, for the decay window and the session lifetime.
pub const MAX_DURATION_DAYS: i64 = 3650;

/// How many failures lock a throttle key, and for how long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutPolicy {
    /// When false, no attempts are recorded and no key is ever locked.
    pub enabled: bool,
    /// Failures inside the window at which the key locks.
    pub max_attempts: u32,
    /// How long a failure keeps counting after it happened. Millisecond precision.
    #[serde(with = "fractional_seconds", rename = "decay_seconds")]
    pub decay_window: Duration,
    /// Whether attempts made while already locked out count as new failures.
    pub reinforce_lockout: bool,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            decay_window: Duration::seconds(DEFAULT_DECAY_SECONDS),
            reinforce_lockout: true,
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, decay_window: Duration) -> Self {
        Self {
            max_attempts,
            decay_window,
            ..Self::default()
        }
    }

    /// Build a policy from a fractional number of minutes, e.g. `0.5` for thirty seconds.
    ///
    /// Fails when `minutes` is not finite or does not fit in a duration.
    pub fn from_decay_minutes(max_attempts: u32, minutes: f64) -> Result<Self, ValidationError> {
        let decay_window = duration_from_seconds(minutes * 60.0).ok_or_else(|| {
            ValidationError::InvalidConfig(format!("decay window of {minutes} minutes"))
        })?;
        Ok(Self::new(max_attempts, decay_window))
    }

    /// A policy that never locks anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_reinforce_lockout(mut self, reinforce: bool) -> Self {
        self.reinforce_lockout = reinforce;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.decay_window <= Duration::zero() {
            return Err(ValidationError::InvalidConfig(
                "decay window must be positive".to_string(),
            ));
        }
        if self.decay_window > max_duration() {
            return Err(ValidationError::InvalidConfig(format!(
                "decay window must not exceed {MAX_DURATION_DAYS} days"
            )));
        }
        Ok(())
    }
}

/// What to do when the attempt ledger cannot be read during the lockout check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerFailurePolicy {
    /// Treat the key as locked out for one full decay window.
    #[default]
    FailClosed,
    /// Continue to credential verification as if no failures were recorded.
    FailOpen,
}

/// Top-level configuration for the login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub lockout: LockoutPolicy,
    pub ledger_failure: LedgerFailurePolicy,
    /// Where to send a user after login when no intended destination was captured.
    pub home_destination: String,
    #[serde(with = "fractional_seconds", rename = "session_lifetime_seconds")]
    pub session_lifetime: Duration,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            lockout: LockoutPolicy::default(),
            ledger_failure: LedgerFailurePolicy::default(),
            home_destination: "/dashboard".to_string(),
            session_lifetime: Duration::days(30),
        }
    }
}

impl LoginConfig {
    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    pub fn with_ledger_failure(mut self, policy: LedgerFailurePolicy) -> Self {
        self.ledger_failure = policy;
        self
    }

    pub fn with_home_destination(mut self, destination: impl Into<String>) -> Self {
        self.home_destination = destination.into();
        self
    }

    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.lockout.validate()?;
        if !self.home_destination.starts_with('/') {
            return Err(ValidationError::InvalidConfig(
                "home destination must be an absolute path".to_string(),
            ));
        }
        if self.session_lifetime <= Duration::zero() {
            return Err(ValidationError::InvalidConfig(
                "session lifetime must be positive".to_string(),
            ));
        }
        if self.session_lifetime > max_duration() {
            return Err(ValidationError::InvalidConfig(format!(
                "session lifetime must not exceed {MAX_DURATION_DAYS} days"
            )));
        }
        Ok(())
    }
}

fn max_duration() -> Duration {
    Duration::days(MAX_DURATION_DAYS)
}

/// Millisecond-rounded duration, or `None` when `seconds` is not finite or out of range.
fn duration_from_seconds(seconds: f64) -> Option<Duration> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

mod fractional_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.num_milliseconds() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        super::duration_from_seconds(seconds).ok_or_else(|| {
            serde::de::Error::custom(format!("{seconds} seconds is not a representable duration"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoginConfig::default();
        assert!(config.lockout.enabled);
        assert_eq!(config.lockout.max_attempts, 3);
        assert_eq!(config.lockout.decay_window, Duration::seconds(30));
        assert!(config.lockout.reinforce_lockout);
        assert_eq!(config.ledger_failure, LedgerFailurePolicy::FailClosed);
        assert_eq!(config.home_destination, "/dashboard");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fractional_minutes_are_not_rounded() {
        let policy = LockoutPolicy::from_decay_minutes(3, 0.5).unwrap();
        assert_eq!(policy.decay_window, Duration::seconds(30));

        let policy = LockoutPolicy::from_decay_minutes(3, 0.025).unwrap();
        assert_eq!(policy.decay_window, Duration::milliseconds(1500));

        assert!(LockoutPolicy::from_decay_minutes(3, f64::NAN).is_err());
        assert!(LockoutPolicy::from_decay_minutes(3, 1e300).is_err());
    }

    #[test]
    fn test_deserialize_rejects_unrepresentable_durations() {
        for decay in ["-1e30", "1e16", "1e300"] {
            let json = format!(r#"{{ "lockout": {{ "decay_seconds": {decay} }} }}"#);
            assert!(
                serde_json::from_str::<LoginConfig>(&json).is_err(),
                "decay_seconds {decay} should be rejected"
            );
        }

        let result =
            serde_json::from_str::<LoginConfig>(r#"{ "session_lifetime_seconds": -1e30 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_windows() {
        // Representable, but far beyond any sensible lockout
        let config: LoginConfig =
            serde_json::from_str(r#"{ "lockout": { "decay_seconds": 1e12 } }"#).unwrap();
        assert!(config.validate().is_err());

        let policy = LockoutPolicy::new(3, Duration::days(MAX_DURATION_DAYS));
        assert!(policy.validate().is_ok());
        let policy = LockoutPolicy::new(3, Duration::days(MAX_DURATION_DAYS + 1));
        assert!(policy.validate().is_err());

        let config = LoginConfig::default().with_session_lifetime(Duration::days(100_000));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: LoginConfig = serde_json::from_str(
            r#"{
                "lockout": { "max_attempts": 5, "decay_seconds": 12.5 },
                "ledger_failure": "fail_open"
            }"#,
        )
        .unwrap();

        assert_eq!(config.lockout.max_attempts, 5);
        assert_eq!(config.lockout.decay_window, Duration::milliseconds(12_500));
        assert!(config.lockout.enabled);
        assert_eq!(config.ledger_failure, LedgerFailurePolicy::FailOpen);
        assert_eq!(config.home_destination, "/dashboard");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(LockoutPolicy::new(0, Duration::seconds(30)).validate().is_err());
        assert!(LockoutPolicy::new(3, Duration::zero()).validate().is_err());
        assert!(
            LoginConfig::default()
                .with_home_destination("https://evil.example")
                .validate()
                .is_err()
        );
    }
}
