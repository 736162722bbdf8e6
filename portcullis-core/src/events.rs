use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{UserId, error::EventError, throttle::ThrottleKey};

/// Represents events that can be emitted by the event bus
///
/// The login flow emits these so applications can hook alerting, audit logging or metrics
/// onto lockouts and failures without the flow knowing about them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    /// Emitted when credentials were checked and rejected.
    LoginFailed {
        key: ThrottleKey,
        /// Failures recorded in the current decay window, including this one
        failed_attempts: u32,
        ip_address: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted whenever an attempt is refused because its throttle key is locked out.
    ///
    /// This is a security-relevant event that should usually trigger alerts.
    Lockout {
        key: ThrottleKey,
        failed_attempts: u32,
        retry_after_seconds: u64,
        ip_address: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted once a session has been established for a principal.
    LoginSucceeded {
        user_id: UserId,
        ip_address: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a session is explicitly revoked (logout).
    SessionRevoked {
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
}

/// A trait for handling events emitted by the event bus
///
/// Implementors of this trait can be registered with the [`EventBus`] to receive and process events.
///
/// # Examples
///
/// ```
/// # use portcullis_core::events::{Event, EventHandler};
/// # use portcullis_core::error::EventError;
/// # use async_trait::async_trait;
/// struct AlertOnLockout;
///
/// #[async_trait]
/// impl EventHandler for AlertOnLockout {
///     async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
///         if let Event::Lockout { key, .. } = event {
///             println!("locked out: {key}");
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

/// Event bus that can emit events and register event handlers
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an event handler with the event bus
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers
    ///
    /// Every handler sees the event even if an earlier one fails; the first error is returned.
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        let handlers = self.handlers.read().await.clone();
        let mut first_error = None;

        for handler in handlers {
            if let Err(e) = handler.handle_event(event).await {
                tracing::warn!(error = %e, "Event handler failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestEventHandler {
        called: Arc<AtomicBool>,
        call_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for TestEventHandler {
        async fn handle_event(&self, _event: &Event) -> Result<(), EventError> {
            self.called.store(true, Ordering::SeqCst);
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ErroringEventHandler;

    #[async_trait]
    impl EventHandler for ErroringEventHandler {
        async fn handle_event(&self, _event: &Event) -> Result<(), EventError> {
            Err(EventError::BusError("Test error".into()))
        }
    }

    fn lockout_event() -> Event {
        Event::Lockout {
            key: ThrottleKey::new("test@example.com", Some("127.0.0.1")),
            failed_attempts: 3,
            retry_after_seconds: 30,
            ip_address: Some("127.0.0.1".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_empty() {
        let event_bus = EventBus::default();
        event_bus
            .emit(&lockout_event())
            .await
            .expect("Failed to emit event");
    }

    #[tokio::test]
    async fn test_event_bus_multiple_handlers() {
        let event_bus = EventBus::default();
        let called1 = Arc::new(AtomicBool::new(false));
        let count1 = Arc::new(AtomicUsize::new(0));
        let called2 = Arc::new(AtomicBool::new(false));
        let count2 = Arc::new(AtomicUsize::new(0));

        event_bus
            .register(Arc::new(TestEventHandler {
                called: called1.clone(),
                call_count: count1.clone(),
            }))
            .await;
        event_bus
            .register(Arc::new(TestEventHandler {
                called: called2.clone(),
                call_count: count2.clone(),
            }))
            .await;

        event_bus
            .emit(&lockout_event())
            .await
            .expect("Failed to emit event");

        assert!(called1.load(Ordering::SeqCst));
        assert!(called2.load(Ordering::SeqCst));
        assert_eq!(count1.load(Ordering::SeqCst), 1);
        assert_eq!(count2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_starve_the_rest() {
        let event_bus = EventBus::default();
        let called = Arc::new(AtomicBool::new(false));

        event_bus.register(Arc::new(ErroringEventHandler)).await;
        event_bus
            .register(Arc::new(TestEventHandler {
                called: called.clone(),
                call_count: Arc::new(AtomicUsize::new(0)),
            }))
            .await;

        let result = event_bus.emit(&lockout_event()).await;
        assert!(matches!(result, Err(EventError::BusError(_))));
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_event_bus_all_event_types() {
        let event_bus = EventBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        event_bus
            .register(Arc::new(TestEventHandler {
                called: Arc::new(AtomicBool::new(false)),
                call_count: count.clone(),
            }))
            .await;

        let user_id = UserId::new_random();
        let events = vec![
            lockout_event(),
            Event::LoginFailed {
                key: ThrottleKey::new("test@example.com", None),
                failed_attempts: 1,
                ip_address: None,
                timestamp: Utc::now(),
            },
            Event::LoginSucceeded {
                user_id: user_id.clone(),
                ip_address: None,
                timestamp: Utc::now(),
            },
            Event::SessionRevoked {
                user_id,
                timestamp: Utc::now(),
            },
        ];

        for event in events {
            event_bus.emit(&event).await.expect("Failed to emit event");
        }

        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
