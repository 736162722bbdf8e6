//! CAPTCHA verification seam
//!
//! Challenge generation and the provider round-trip live outside this crate; the login flow
//! only needs a yes/no answer for a response token.

use async_trait::async_trait;

use crate::Error;

#[async_trait]
pub trait CaptchaVerifier: Send + Sync + 'static {
    /// Ask the provider whether `token` is a valid response, optionally bound to the client IP.
    ///
    /// Returns `Ok(false)` for a rejected token; `Err` only when the provider could not be
    /// reached or answered garbage.
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, Error>;
}

/// A verifier that gives the same answer for every token.
///
/// Useful for tests and for deployments that run without a CAPTCHA provider.
#[derive(Debug, Clone, Copy)]
pub struct StaticCaptchaVerifier {
    accept: bool,
}

impl StaticCaptchaVerifier {
    pub fn accept_all() -> Self {
        Self { accept: true }
    }

    pub fn reject_all() -> Self {
        Self { accept: false }
    }
}

#[async_trait]
impl CaptchaVerifier for StaticCaptchaVerifier {
    async fn verify(&self, _token: &str, _remote_ip: Option<&str>) -> Result<bool, Error> {
        Ok(self.accept)
    }
}
