//! Prefixed identifier generation
//!
//! Identifiers look like `usr_<base64>` with at least 96 bits of entropy and are URL-safe.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::RngCore;

/// Minimum number of random bytes in an identifier (96 bits).
const MIN_ID_BYTES: usize = 12;

/// Generate a prefixed ID with 96 bits of entropy
///
/// The ID format is `{prefix}_{random}` where the random part is base64 URL-safe
/// encoded without padding.
pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; MIN_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{prefix}_{}", BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// Validate that a prefixed ID has the expected prefix and enough entropy
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    BASE64_URL_SAFE_NO_PAD
        .decode(random_part)
        .is_ok_and(|decoded| decoded.len() >= MIN_ID_BYTES)
}
