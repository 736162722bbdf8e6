//! Throttle keys
//!
//! A throttle key scopes a lockout to one (identifier, client origin) pair. Repeated
//! attempts against the same identifier from the same origin accumulate together, while
//! the same identifier from another origin gets its own budget.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder origin used when the client address is unknown.
const UNKNOWN_ORIGIN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThrottleKey(String);

impl ThrottleKey {
    /// Derive the key for a login identifier and client address.
    ///
    /// The identifier is trimmed and lowercased so `Alice@Example.com ` and
    /// `alice@example.com` share a budget.
    pub fn new(identifier: &str, ip_address: Option<&str>) -> Self {
        let identifier = normalize_identifier(identifier);
        let origin = ip_address
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .unwrap_or(UNKNOWN_ORIGIN);
        ThrottleKey(format!("{identifier}|{origin}"))
    }

    /// Wrap an already-derived key, e.g. one read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        ThrottleKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a login identifier for comparisons and throttling.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}
