use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use portcullis::captcha::StaticCaptchaVerifier;
use portcullis::{
    ClientInfo, Event, EventHandler, LoginConfig, LoginContext, LoginOutcome, LoginRequest,
    ManualClock, NewUser, Portcullis, SqliteRepositoryProvider, User,
};
use portcullis_core::Clock;
use portcullis_core::error::EventError;
use portcullis_core::repositories::{
    AccountAttemptRepository, AccountAttemptRepositoryProvider, AttemptLedger,
    AttemptLedgerProvider, RepositoryProvider, UserRepository, UserRepositoryProvider,
};
use portcullis_core::throttle::ThrottleKey;

const EMAIL: &str = "alice@example.com";
const PASSWORD: &str = "correct horse battery staple";
const IP: &str = "203.0.113.7";

struct Harness {
    portcullis: Portcullis<SqliteRepositoryProvider>,
    repositories: Arc<SqliteRepositoryProvider>,
    clock: ManualClock,
    user: User,
}

async fn setup() -> Harness {
    let _ = tracing_subscriber::fmt().try_init();

    let repositories = Arc::new(
        SqliteRepositoryProvider::connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    repositories.migrate().await.unwrap();

    let user = repositories
        .user()
        .create(
            NewUser::builder()
                .email(EMAIL)
                .password_hash(password_auth::generate_hash(PASSWORD))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    let clock = ManualClock::new(Utc::now());
    let portcullis = Portcullis::new(
        repositories.clone(),
        Arc::new(StaticCaptchaVerifier::accept_all()),
        LoginConfig::default(),
    )
    .unwrap()
    .with_clock(Arc::new(clock.clone()));

    Harness {
        portcullis,
        repositories,
        clock,
        user,
    }
}

fn request(password: &str) -> LoginRequest {
    LoginRequest::new(EMAIL, password, Some("captcha-response".to_string()))
}

fn context() -> LoginContext {
    LoginContext::new(ClientInfo::new(
        Some(IP.to_string()),
        Some("integration-test".to_string()),
    ))
}

fn key() -> ThrottleKey {
    ThrottleKey::new(EMAIL, Some(IP))
}

async fn failed_count(harness: &Harness) -> u32 {
    harness
        .repositories
        .attempt_ledger()
        .snapshot(&key(), harness.clock.now(), Duration::seconds(30))
        .await
        .unwrap()
        .failed_count
}

#[tokio::test]
async fn test_first_attempt_success() {
    let harness = setup().await;

    let outcome = harness
        .portcullis
        .login(request(PASSWORD), context())
        .await
        .unwrap();

    match outcome {
        LoginOutcome::SessionEstablished {
            redirect_target,
            session,
        } => {
            assert_eq!(redirect_target, "/dashboard");
            assert_eq!(session.user_id, harness.user.id);
            assert_eq!(session.ip_address.as_deref(), Some(IP));
        }
        other => panic!("expected a session, got {other:?}"),
    }

    assert_eq!(failed_count(&harness).await, 0);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM login_throttle")
        .fetch_one(harness.repositories.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_fourth_attempt_is_locked_out_even_with_correct_password() {
    let harness = setup().await;

    for _ in 0..3 {
        let outcome = harness
            .portcullis
            .login(request("wrong password"), context())
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::AuthFailed { .. }));
        harness.clock.advance(Duration::seconds(1));
    }
    assert_eq!(failed_count(&harness).await, 3);

    harness.clock.advance(Duration::seconds(2));
    let outcome = harness
        .portcullis
        .login(request(PASSWORD), context())
        .await
        .unwrap();

    match outcome {
        LoginOutcome::LockedOut {
            message,
            retry_after_seconds,
            old_input,
        } => {
            assert!(retry_after_seconds > 0 && retry_after_seconds <= 30);
            assert_eq!(
                message,
                format!(
                    "Too many login attempts. Please try again in {retry_after_seconds} seconds."
                )
            );
            assert_eq!(old_input.identifier, EMAIL);
        }
        other => panic!("expected a lockout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lockout_expires_after_decay_window() {
    let harness = setup().await;

    for _ in 0..3 {
        harness
            .portcullis
            .login(request("wrong password"), context())
            .await
            .unwrap();
    }
    let locked = harness
        .portcullis
        .login(request(PASSWORD), context())
        .await
        .unwrap();
    assert!(matches!(locked, LoginOutcome::LockedOut { .. }));

    harness.clock.advance(Duration::seconds(31));
    let outcome = harness
        .portcullis
        .login(request(PASSWORD), context())
        .await
        .unwrap();
    assert!(outcome.is_success(), "expected a session, got {outcome:?}");
    assert_eq!(failed_count(&harness).await, 0);
}

#[tokio::test]
async fn test_lockout_is_scoped_to_client_address() {
    let harness = setup().await;

    for _ in 0..3 {
        harness
            .portcullis
            .login(request("wrong password"), context())
            .await
            .unwrap();
    }

    let elsewhere = LoginContext::new(ClientInfo::new(Some("198.51.100.1".to_string()), None));
    let outcome = harness
        .portcullis
        .login(request(PASSWORD), elsewhere)
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_identifier_case_shares_a_budget() {
    let harness = setup().await;

    for identifier in ["Alice@Example.com", " alice@example.com", "ALICE@EXAMPLE.COM"] {
        harness
            .portcullis
            .login(
                LoginRequest::new(identifier, "wrong password", Some("captcha".to_string())),
                context(),
            )
            .await
            .unwrap();
    }

    let outcome = harness
        .portcullis
        .login(request(PASSWORD), context())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::LockedOut { .. }));
}

#[tokio::test]
async fn test_empty_password_never_touches_the_ledger() {
    let harness = setup().await;

    for _ in 0..5 {
        let outcome = harness
            .portcullis
            .login(request(""), context())
            .await
            .unwrap();
        match outcome {
            LoginOutcome::Invalid { errors } => assert!(errors.has("secret")),
            other => panic!("expected a validation failure, got {other:?}"),
        }
    }

    assert_eq!(failed_count(&harness).await, 0);
    let outcome = harness
        .portcullis
        .login(request(PASSWORD), context())
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_rejected_captcha_is_a_validation_failure() {
    let harness = setup().await;
    let portcullis = Portcullis::new(
        harness.repositories.clone(),
        Arc::new(StaticCaptchaVerifier::reject_all()),
        LoginConfig::default(),
    )
    .unwrap();

    let outcome = portcullis
        .login(request("wrong password"), context())
        .await
        .unwrap();
    match outcome {
        LoginOutcome::Invalid { errors } => assert!(errors.has("captcha")),
        other => panic!("expected a validation failure, got {other:?}"),
    }
    assert_eq!(failed_count(&harness).await, 0);
}

#[tokio::test]
async fn test_unknown_user_fails_like_wrong_password() {
    let harness = setup().await;

    let unknown = harness
        .portcullis
        .login(
            LoginRequest::new("nobody@example.com", PASSWORD, Some("captcha".to_string())),
            context(),
        )
        .await
        .unwrap();
    let wrong = harness
        .portcullis
        .login(request("wrong password"), context())
        .await
        .unwrap();

    match (unknown, wrong) {
        (
            LoginOutcome::AuthFailed {
                message: unknown_message,
                ..
            },
            LoginOutcome::AuthFailed {
                message: wrong_message,
                errors,
                ..
            },
        ) => {
            assert_eq!(unknown_message, wrong_message);
            assert_eq!(
                errors.get("identifier"),
                ["These credentials do not match our records.".to_string()]
            );
        }
        other => panic!("expected two auth failures, got {other:?}"),
    }
}

#[tokio::test]
async fn test_account_columns_mirror_attempts() {
    let harness = setup().await;

    for _ in 0..2 {
        harness
            .portcullis
            .login(request("wrong password"), context())
            .await
            .unwrap();
    }

    let fields = harness
        .repositories
        .account_attempts()
        .get_login_attempts(EMAIL)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields.login_attempts, 2);
    assert!(fields.last_login_attempt.is_some());

    harness
        .portcullis
        .login(request(PASSWORD), context())
        .await
        .unwrap();

    let user = harness
        .portcullis
        .get_user(&harness.user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.attempts.login_attempts, 0);
    assert!(user.attempts.last_login_attempt.is_some());
}

#[tokio::test]
async fn test_intended_destination_is_honored() {
    let harness = setup().await;

    let outcome = harness
        .portcullis
        .login(request(PASSWORD), context().with_intended("/reports/42"))
        .await
        .unwrap();
    match outcome {
        LoginOutcome::SessionEstablished {
            redirect_target, ..
        } => assert_eq!(redirect_target, "/reports/42"),
        other => panic!("expected a session, got {other:?}"),
    }

    let outcome = harness
        .portcullis
        .login(
            request(PASSWORD),
            context().with_intended("//evil.example.com/"),
        )
        .await
        .unwrap();
    match outcome {
        LoginOutcome::SessionEstablished {
            redirect_target, ..
        } => assert_eq!(redirect_target, "/dashboard"),
        other => panic!("expected a session, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_failures_are_all_counted() {
    let harness = setup().await;
    let portcullis = Arc::new(harness.portcullis.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let portcullis = portcullis.clone();
            tokio::spawn(async move {
                portcullis
                    .login(request("wrong password"), context())
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            LoginOutcome::AuthFailed { .. } | LoginOutcome::LockedOut { .. }
        ));
    }

    // Every attempt is recorded, whether it failed verification or hit the lockout
    assert_eq!(failed_count(&harness).await, 8);
}

struct LockoutCounter {
    lockouts: Arc<AtomicUsize>,
}

#[async_trait]
impl EventHandler for LockoutCounter {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
        if matches!(event, Event::Lockout { .. }) {
            self.lockouts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_lockout_observers_are_notified() {
    let harness = setup().await;
    let lockouts = Arc::new(AtomicUsize::new(0));
    harness
        .portcullis
        .event_bus()
        .register(Arc::new(LockoutCounter {
            lockouts: lockouts.clone(),
        }))
        .await;

    for _ in 0..4 {
        harness
            .portcullis
            .login(request("wrong password"), context())
            .await
            .unwrap();
    }

    assert_eq!(lockouts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lockout_status() {
    let harness = setup().await;
    for _ in 0..3 {
        harness
            .portcullis
            .login(request("wrong password"), context())
            .await
            .unwrap();
    }

    let status = harness
        .portcullis
        .lockout_status(EMAIL, Some(IP))
        .await
        .unwrap();
    assert!(status.locked);
    assert_eq!(status.failed_attempts, 3);
    assert_eq!(status.retry_after_seconds, 30);
}
