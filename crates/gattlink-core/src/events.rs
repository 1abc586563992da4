//! Connection event system.
//!
//! Every lifecycle transition of a connection is published as a
//! [`LinkEvent`] on a broadcast channel. Failures that are swallowed by design
//! (probe ticks, teardown writes) are published here as well as logged, so
//! applications can observe them without parsing logs.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use gattlink_types::CharacteristicId;

/// Events emitted by a connection.
///
/// All events are serializable for logging, persistence, and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum LinkEvent {
    /// The connection was marked active.
    Connected,
    /// Teardown finished.
    Disconnected {
        /// Number of characteristics that were subscribed at teardown.
        attempted: usize,
        /// Number of disable writes that failed.
        failed: usize,
        /// Whether the caller's deadline cut teardown short.
        timed_out: bool,
    },
    /// The keep-alive probe was started.
    ProbeStarted,
    /// The keep-alive probe was stopped.
    ProbeStopped,
    /// A keep-alive probe tick failed.
    ProbeFailed { error: String },
    /// A characteristic was added to the subscriber set.
    Subscribed { characteristic: CharacteristicId },
    /// A characteristic was removed from the subscriber set.
    Unsubscribed { characteristic: CharacteristicId },
    /// A disable-notifications write failed during teardown.
    UnsubscribeFailed {
        characteristic: CharacteristicId,
        error: String,
    },
    /// A discovery call was issued. `service` is `None` for service discovery.
    DiscoveryStarted { service: Option<Uuid> },
    /// A discovery call failed.
    DiscoveryFailed {
        service: Option<Uuid>,
        error: String,
    },
}

/// Sender for link events.
pub type EventSender = broadcast::Sender<LinkEvent>;

/// Receiver for link events.
pub type EventReceiver = broadcast::Receiver<LinkEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: LinkEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_receivers_is_ignored() {
        let events = EventDispatcher::default();
        events.send(LinkEvent::ProbeStarted);
        assert_eq!(events.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = EventDispatcher::new(8);
        let mut rx = events.subscribe();
        events.send(LinkEvent::Connected);
        events.send(LinkEvent::ProbeStarted);

        assert_eq!(rx.recv().await.unwrap(), LinkEvent::Connected);
        assert_eq!(rx.recv().await.unwrap(), LinkEvent::ProbeStarted);
    }

    #[test]
    fn test_event_serialization() {
        let event = LinkEvent::UnsubscribeFailed {
            characteristic: CharacteristicId::new(Uuid::nil(), Uuid::nil()),
            error: "link lost".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"unsubscribe_failed\""));
        assert!(json.contains("link lost"));

        let back: LinkEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_unit_event_serialization() {
        let json = serde_json::to_string(&LinkEvent::ProbeStopped).unwrap();
        assert_eq!(json, r#"{"type":"probe_stopped"}"#);
    }
}
