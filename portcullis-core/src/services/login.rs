//! The login state machine.
//!
//! [`LoginService::login`] drives one submission through
//!
//! ```text
//! validate input ─┬─ invalid ──────────────────────────────► Invalid
//!                 └─ check lockout ─┬─ locked ─────────────► LockedOut
//!                                   └─ verify credentials ─┬─ ok ───► SessionEstablished
//!                                                          └─ bad ──► AuthFailed
//! ```
//!
//! Validation failures never touch the attempt ledger. A locked key is refused before the
//! credential verifier runs, even when the credentials would have been correct.
//!
//! Side effects after the decision (ledger writes, the account attempt mirror, events) are
//! best-effort: failures are logged and the caller still gets the outcome that was decided.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{
    Error, Session, UserId,
    captcha::CaptchaVerifier,
    clock::{Clock, SystemClock},
    config::{LedgerFailurePolicy, LoginConfig},
    credentials::{AuthResult, CredentialVerifier},
    events::{Event, EventBus},
    repositories::{AccountAttemptRepository, AttemptLedger},
    services::rate_limiter::{LockoutDecision, RateLimiter, seconds_until_decay},
    session::{ClientInfo, SessionManager, SessionToken},
    throttle::{ThrottleKey, normalize_identifier},
    validation::{FieldErrors, IDENTIFIER_FIELD, validate_login_input},
};

/// Message returned for rejected credentials. Deliberately says nothing about which part
/// was wrong.
pub const AUTH_FAILED_MESSAGE: &str = "These credentials do not match our records.";

/// Message shown while a throttle key is locked out.
pub fn lockout_message(retry_after_seconds: u64) -> String {
    format!("Too many login attempts. Please try again in {retry_after_seconds} seconds.")
}

/// A login submission.
#[derive(Debug)]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: SecretString,
    pub captcha_token: Option<String>,
}

impl LoginRequest {
    pub fn new(
        identifier: impl Into<String>,
        secret: impl Into<String>,
        captcha_token: Option<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            secret: SecretString::from(secret.into()),
            captcha_token,
        }
    }
}

/// Request metadata that is not part of the submitted form.
#[derive(Debug, Clone, Default)]
pub struct LoginContext {
    pub client: ClientInfo,
    /// Where the user was headed before being sent to log in
    pub intended: Option<String>,
    /// Session the client held before authenticating, if any
    pub previous_session: Option<SessionToken>,
}

impl LoginContext {
    pub fn new(client: ClientInfo) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    pub fn with_intended(mut self, intended: impl Into<String>) -> Self {
        self.intended = Some(intended.into());
        self
    }

    pub fn with_previous_session(mut self, token: SessionToken) -> Self {
        self.previous_session = Some(token);
        self
    }
}

/// Submitted values echoed back so a form can be re-populated. Never contains the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldInput {
    pub identifier: String,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    SessionEstablished {
        redirect_target: String,
        session: Session,
    },
    LockedOut {
        message: String,
        retry_after_seconds: u64,
        old_input: OldInput,
    },
    AuthFailed {
        message: String,
        /// The generic message keyed to the identifier field
        errors: FieldErrors,
        old_input: OldInput,
    },
    Invalid {
        errors: FieldErrors,
    },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::SessionEstablished { .. })
    }
}

/// Pick the post-login destination: the intended path when it is local, otherwise `home`.
pub fn resolve_redirect(intended: Option<&str>, home: &str) -> String {
    match intended {
        Some(path) if is_local_path(path) => path.to_string(),
        _ => home.to_string(),
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// Runs login submissions against the attempt ledger, credentials and sessions.
pub struct LoginService {
    ledger: Arc<dyn AttemptLedger>,
    limiter: RateLimiter<dyn AttemptLedger>,
    clock: Arc<dyn Clock>,
    credentials: Arc<dyn CredentialVerifier>,
    sessions: Arc<dyn SessionManager>,
    captcha: Arc<dyn CaptchaVerifier>,
    account_attempts: Option<Arc<dyn AccountAttemptRepository>>,
    events: EventBus,
    config: LoginConfig,
}

impl LoginService {
    pub fn new(
        ledger: Arc<dyn AttemptLedger>,
        credentials: Arc<dyn CredentialVerifier>,
        sessions: Arc<dyn SessionManager>,
        captcha: Arc<dyn CaptchaVerifier>,
        config: LoginConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            limiter: RateLimiter::with_clock(ledger.clone(), clock.clone()),
            ledger,
            clock,
            credentials,
            sessions,
            captcha,
            account_attempts: None,
            events: EventBus::default(),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.limiter = RateLimiter::with_clock(self.ledger.clone(), clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Mirror attempt counts onto user rows.
    pub fn with_account_attempts(mut self, repository: Arc<dyn AccountAttemptRepository>) -> Self {
        self.account_attempts = Some(repository);
        self
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter<dyn AttemptLedger> {
        &self.limiter
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Run one login attempt.
    ///
    /// Returns `Err` only for infrastructure failures the outcome cannot absorb: the credential
    /// store or session store being unavailable.
    pub async fn login(
        &self,
        request: LoginRequest,
        context: LoginContext,
    ) -> Result<LoginOutcome, Error> {
        let ip_address = context.client.ip_address.as_deref();

        let errors = validate_login_input(
            &request.identifier,
            &request.secret,
            request.captcha_token.as_deref(),
            ip_address,
            self.captcha.as_ref(),
        )
        .await;
        if !errors.is_empty() {
            tracing::debug!("Login rejected by validation");
            return Ok(LoginOutcome::Invalid { errors });
        }

        let key = ThrottleKey::new(&request.identifier, ip_address);
        let old_input = OldInput {
            identifier: request.identifier.clone(),
        };

        let decision = self.check_lockout(&key).await;
        if decision.locked {
            return Ok(self
                .lockout(&key, &request.identifier, decision, &context, old_input)
                .await);
        }

        match self
            .credentials
            .verify(&request.identifier, &request.secret)
            .await?
        {
            AuthResult::Authenticated(user_id) => {
                self.succeed(&key, &request.identifier, user_id, context)
                    .await
            }
            AuthResult::Rejected => {
                Ok(self
                    .fail(&key, &request.identifier, &context, old_input)
                    .await)
            }
        }
    }

    async fn check_lockout(&self, key: &ThrottleKey) -> LockoutDecision {
        let policy = &self.config.lockout;
        if !policy.enabled {
            return LockoutDecision::unlocked();
        }

        match self
            .limiter
            .decision(key, policy.max_attempts, policy.decay_window)
            .await
        {
            Ok(decision) => decision,
            Err(e) => match self.config.ledger_failure {
                LedgerFailurePolicy::FailClosed => {
                    tracing::warn!(error = %e, key = %key, "Attempt ledger unavailable, refusing login");
                    LockoutDecision::locked_for(policy.decay_window)
                }
                LedgerFailurePolicy::FailOpen => {
                    tracing::warn!(error = %e, key = %key, "Attempt ledger unavailable, continuing without lockout check");
                    LockoutDecision::unlocked()
                }
            },
        }
    }

    async fn lockout(
        &self,
        key: &ThrottleKey,
        identifier: &str,
        decision: LockoutDecision,
        context: &LoginContext,
        old_input: OldInput,
    ) -> LoginOutcome {
        let policy = &self.config.lockout;
        let mut failed_attempts = decision.failed_attempts;
        let mut retry_after_seconds = decision.retry_after_seconds;

        if policy.reinforce_lockout {
            match self.limiter.hit(key, policy.decay_window).await {
                Ok(record) => {
                    failed_attempts = record.failed_count;
                    retry_after_seconds = seconds_until_decay(
                        &record,
                        policy.decay_window,
                        self.limiter.now(),
                    )
                    .max(retry_after_seconds);
                }
                Err(e) => {
                    tracing::error!(error = %e, key = %key, "Failed to record attempt during lockout");
                }
            }
            self.record_account_attempt(identifier, self.clock.now())
                .await;
        }

        tracing::warn!(
            key = %key,
            failed_attempts,
            retry_after_seconds,
            "Login refused, too many attempts"
        );

        self.emit(Event::Lockout {
            key: key.clone(),
            failed_attempts,
            retry_after_seconds,
            ip_address: context.client.ip_address.clone(),
            timestamp: self.clock.now(),
        })
        .await;

        LoginOutcome::LockedOut {
            message: lockout_message(retry_after_seconds),
            retry_after_seconds,
            old_input,
        }
    }

    async fn succeed(
        &self,
        key: &ThrottleKey,
        identifier: &str,
        user_id: UserId,
        context: LoginContext,
    ) -> Result<LoginOutcome, Error> {
        if let Some(previous) = &context.previous_session {
            if let Err(e) = self.sessions.regenerate(previous).await {
                tracing::warn!(error = %e, "Failed to invalidate previous session");
            }
        }

        let session = self
            .sessions
            .establish(&user_id, &context.client, self.config.session_lifetime)
            .await?;

        if self.config.lockout.enabled {
            if let Err(e) = self.limiter.clear(key).await {
                tracing::error!(error = %e, key = %key, "Failed to clear attempt ledger");
            }
        }

        if let Some(account_attempts) = &self.account_attempts {
            if let Err(e) = account_attempts
                .reset_login_attempts(&normalize_identifier(identifier))
                .await
            {
                tracing::warn!(error = %e, "Failed to reset account login attempts");
            }
        }

        tracing::info!(user_id = %user_id, "Login succeeded");

        self.emit(Event::LoginSucceeded {
            user_id,
            ip_address: context.client.ip_address.clone(),
            timestamp: self.clock.now(),
        })
        .await;

        Ok(LoginOutcome::SessionEstablished {
            redirect_target: resolve_redirect(
                context.intended.as_deref(),
                &self.config.home_destination,
            ),
            session,
        })
    }

    async fn fail(
        &self,
        key: &ThrottleKey,
        identifier: &str,
        context: &LoginContext,
        old_input: OldInput,
    ) -> LoginOutcome {
        let policy = &self.config.lockout;
        let now = self.clock.now();
        let mut failed_attempts = 0;

        if policy.enabled {
            match self.limiter.hit(key, policy.decay_window).await {
                Ok(record) => failed_attempts = record.failed_count,
                Err(e) => {
                    tracing::error!(error = %e, key = %key, "Failed to record failed attempt");
                }
            }
        }

        self.record_account_attempt(identifier, now).await;

        tracing::info!(key = %key, failed_attempts, "Login failed");

        self.emit(Event::LoginFailed {
            key: key.clone(),
            failed_attempts,
            ip_address: context.client.ip_address.clone(),
            timestamp: now,
        })
        .await;

        LoginOutcome::AuthFailed {
            message: AUTH_FAILED_MESSAGE.to_string(),
            errors: FieldErrors::single(IDENTIFIER_FIELD, AUTH_FAILED_MESSAGE),
            old_input,
        }
    }

    async fn record_account_attempt(&self, identifier: &str, now: DateTime<Utc>) {
        let Some(account_attempts) = &self.account_attempts else {
            return;
        };
        if let Err(e) = account_attempts
            .record_login_attempt(&normalize_identifier(identifier), now)
            .await
        {
            tracing::warn!(error = %e, "Failed to update account login attempts");
        }
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.events.emit(&event).await {
            tracing::warn!(error = %e, "Login event handler failed");
        }
    }
}
