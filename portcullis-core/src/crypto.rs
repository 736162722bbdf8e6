//! Session token generation and hashing
//!
//! Session tokens are 256-bit random values handed to the client once. Only their SHA256
//! digest is stored, so a leaked sessions table cannot be replayed as cookies.
//!
//! SHA256 (rather than a password hash) is sufficient here because the tokens are
//! high-entropy; brute-forcing the preimage is infeasible.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure random token.
///
/// Produces 32 random bytes encoded as URL-safe base64 (43 characters).
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Hash a token for storage and lookup. Returns the hex-encoded SHA256 digest.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_token_length_and_uniqueness() {
        let a = generate_secure_token();
        let b = generate_secure_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let hash = hash_token("test_token");
        assert_eq!(hash, hash_token("test_token"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash, hash_token("other_token"));
    }
}
