//! Service layer
//!
//! Services hold repositories and collaborators behind `Arc`s and carry the login logic.

pub mod login;
pub mod rate_limiter;

pub use login::{LoginContext, LoginOutcome, LoginRequest, LoginService, OldInput};
pub use rate_limiter::{LockoutDecision, RateLimiter};
