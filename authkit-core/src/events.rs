//! In-process publish/subscribe for session lifecycle events.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::token::Token;

/// Session lifecycle notification.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new session was installed.
    SessionChanged {
        /// The token backing the new session.
        token: Token,
    },
    /// The session was torn down.
    LoggedOut {
        /// Subject identifier of the session that ended; empty when no
        /// session was active at logout time.
        user_id: String,
    },
    /// The session's token was replaced by a refresh.
    TokenRefreshed {
        /// Subject identifier of the refreshed session.
        user_id: String,
    },
}

/// Event kind a subscriber registers interest in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// [`SessionEvent::SessionChanged`] events.
    SessionChanged,
    /// [`SessionEvent::LoggedOut`] events.
    LoggedOut,
    /// [`SessionEvent::TokenRefreshed`] events.
    TokenRefreshed,
}

impl SessionEvent {
    /// The topic this event is published under.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::SessionChanged { .. } => Topic::SessionChanged,
            Self::LoggedOut { .. } => Topic::LoggedOut,
            Self::TokenRefreshed { .. } => Topic::TokenRefreshed,
        }
    }
}

/// Identifies a registered subscriber; pass back to
/// [`EventBus::unsubscribe`] to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    topic: Topic,
    handler: Handler,
}

/// Synchronous in-process event channel, scoped to the owning process.
///
/// Delivery is in subscription order on the publishing thread. A panicking
/// handler is isolated and logged; it never prevents delivery to later
/// subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` for events published under `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Subscriber {
            id,
            topic,
            handler: Arc::new(handler),
        });
        SubscriptionHandle(id)
    }

    /// Removes the subscriber identified by `handle`. Unknown handles are a
    /// no-op.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.lock().retain(|s| s.id != handle.0);
    }

    /// Delivers `event` synchronously to all current subscribers of its
    /// topic, in subscription order.
    pub fn publish(&self, event: &SessionEvent) {
        let topic = event.topic();
        let handlers: Vec<Handler> = self
            .lock()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(?topic, "session event handler panicked");
            }
        }
    }
}
