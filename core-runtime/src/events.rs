//! # Event Bus
//!
//! Broadcasts session lifecycle events from the auth core to any number of
//! host subscribers using `tokio::sync::broadcast`.
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));
//!
//! assert_eq!(rx.recv().await.unwrap(), CoreEvent::Auth(AuthEvent::TokenRefreshing));
//! # }
//! ```
//!
//! Subscribers that fall more than `capacity` events behind receive
//! `RecvError::Lagged(n)` and continue from the oldest retained event.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, Receiver};
use tracing::trace;

/// Default per-subscriber buffer.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::SignInFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedOut {
                reason: SignOutReason::RefreshFailed,
            }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::SignedOut { .. }) => EventSeverity::Info,
            CoreEvent::Auth(_) => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Why the stored credential went away.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignOutReason {
    /// The host asked for it.
    UserRequested,
    /// The server rejected the refresh token.
    RefreshFailed,
}

/// Session lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Password login succeeded.
    SignedIn {
        /// Expiry of the new access token (Unix epoch seconds).
        valid_until: i64,
    },
    /// Password login was rejected or could not complete.
    SignInFailed {
        /// Short machine-friendly reason, never contains secrets.
        reason: String,
    },
    /// A refresh-grant exchange started.
    TokenRefreshing,
    /// A refresh-grant exchange produced a new credential.
    TokenRefreshed {
        /// Expiry of the new access token (Unix epoch seconds).
        valid_until: i64,
    },
    /// The stored credential was cleared.
    SignedOut { reason: SignOutReason },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SignedIn { .. } => "User signed in",
            AuthEvent::SignInFailed { .. } => "Sign-in failed",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::SignedOut { .. } => "Session cleared",
        }
    }
}

/// Broadcast channel for [`CoreEvent`]s. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event and returns how many subscribers received it.
    ///
    /// Having no subscribers is normal and yields 0.
    pub fn emit(&self, event: CoreEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!(event = event.description(), "No event subscribers");
                0
            }
        }
    }

    /// Subscribes to all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing)), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Auth(AuthEvent::TokenRefreshed {
            valid_until: 1_597_176_695,
        });
        assert_eq!(bus.emit(event.clone()), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
        assert!(matches!(first.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for valid_until in 0..4 {
            bus.emit(CoreEvent::Auth(AuthEvent::SignedIn { valid_until }));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedIn { valid_until: 2 })
        );
    }

    #[test]
    fn test_severity() {
        let refresh_failed = CoreEvent::Auth(AuthEvent::SignedOut {
            reason: SignOutReason::RefreshFailed,
        });
        let user_signed_out = CoreEvent::Auth(AuthEvent::SignedOut {
            reason: SignOutReason::UserRequested,
        });

        assert_eq!(refresh_failed.severity(), EventSeverity::Warning);
        assert_eq!(user_signed_out.severity(), EventSeverity::Info);
        assert_eq!(
            CoreEvent::Auth(AuthEvent::TokenRefreshing).severity(),
            EventSeverity::Debug
        );
        assert_eq!(refresh_failed.description(), "Session cleared");
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Auth(AuthEvent::SignInFailed {
            reason: "authentication_failed".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Auth");
        assert_eq!(json["payload"]["event"], "SignInFailed");
        assert_eq!(json["payload"]["reason"], "authentication_failed");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
