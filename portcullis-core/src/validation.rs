//! Login input validation
//!
//! Validation runs before anything touches the attempt ledger, so malformed submissions never
//! count against a throttle key. Every problem is collected rather than stopping at the first.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::captcha::CaptchaVerifier;

pub const IDENTIFIER_FIELD: &str = "identifier";
pub const SECRET_FIELD: &str = "secret";
pub const CAPTCHA_FIELD: &str = "captcha";

/// Error messages keyed by input field, in field-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single message on a single field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// The first message across all fields, for single-line displays.
    pub fn first_message(&self) -> Option<&str> {
        self.0.values().flatten().next().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

fn required_message(field: &str) -> String {
    format!("The {field} field is required.")
}

/// Validate a login submission.
///
/// Identifier and secret must be non-blank. The CAPTCHA token must be present and accepted by
/// `captcha`; the verifier is only consulted when a token was supplied. A verifier that errors
/// is treated as a rejection and logged.
pub async fn validate_login_input(
    identifier: &str,
    secret: &SecretString,
    captcha_token: Option<&str>,
    remote_ip: Option<&str>,
    captcha: &dyn CaptchaVerifier,
) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if identifier.trim().is_empty() {
        errors.add(IDENTIFIER_FIELD, required_message(IDENTIFIER_FIELD));
    }

    if secret.expose_secret().trim().is_empty() {
        errors.add(SECRET_FIELD, required_message(SECRET_FIELD));
    }

    match captcha_token.map(str::trim).filter(|t| !t.is_empty()) {
        None => errors.add(CAPTCHA_FIELD, required_message(CAPTCHA_FIELD)),
        Some(token) => match captcha.verify(token, remote_ip).await {
            Ok(true) => {}
            Ok(false) => errors.add(CAPTCHA_FIELD, "The captcha verification failed."),
            Err(e) => {
                tracing::warn!(error = %e, "Captcha verification unavailable");
                errors.add(CAPTCHA_FIELD, "The captcha could not be verified.");
            }
        },
    }

    errors
}
