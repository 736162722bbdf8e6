//! Core functionality for portcullis
//!
//! This crate holds the login state machine and everything it is built from: throttle keys,
//! the attempt ledger and [`RateLimiter`](services::RateLimiter), the collaborator traits for
//! CAPTCHA, credential and session handling, and the [`LoginService`] that ties them together.
//!
//! Storage backends implement the traits in [`repositories`]; see `portcullis-storage-sqlite`.
//! Application code usually goes through the `portcullis` facade instead of using this crate
//! directly.
pub mod captcha;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod events;
pub mod id;
pub mod repositories;
pub mod services;
pub mod session;
pub mod storage;
pub mod throttle;
pub mod user;
pub mod validation;

pub use captcha::CaptchaVerifier;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LedgerFailurePolicy, LockoutPolicy, LoginConfig};
pub use credentials::{AuthResult, CredentialVerifier, PasswordCredentialVerifier};
pub use error::Error;
pub use events::{Event, EventBus, EventHandler};
pub use repositories::{AttemptLedger, InMemoryAttemptLedger, RepositoryProvider};
pub use services::{
    LockoutDecision, LoginContext, LoginOutcome, LoginRequest, LoginService, OldInput,
    RateLimiter,
};
pub use session::{ClientInfo, Session, SessionManager, SessionToken};
pub use storage::{AttemptRecord, NewUser};
pub use throttle::ThrottleKey;
pub use user::{User, UserId};
pub use validation::FieldErrors;
