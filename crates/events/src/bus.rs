//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`; every design-session view
//! publishes to the same bus.

use atelier_core::types::{RecordId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Dot-separated names of the events the studio publishes.
pub mod event_types {
    /// Placeholders were inserted and a job row was accepted.
    pub const VARIATION_ENQUEUED: &str = "variation.enqueued";
    /// Every submission path rejected the job; placeholders were rolled back.
    pub const VARIATION_ENQUEUE_FAILED: &str = "variation.enqueue_failed";
    /// A pushed session row replaced the local session state.
    pub const SESSION_UPDATED: &str = "session.updated";
    /// The variation list was refetched.
    pub const VARIATIONS_RELOADED: &str = "variations.reloaded";
    /// Loading the session or its variations failed.
    pub const SESSION_LOAD_FAILED: &str = "session.load_failed";
}

// ---------------------------------------------------------------------------
// StudioEvent
// ---------------------------------------------------------------------------

/// Something that happened in one design session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioEvent {
    /// Dot-separated event name, see [`event_types`].
    pub event_type: String,

    pub session_id: RecordId,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: Timestamp,
}

impl StudioEvent {
    /// Create an event with an empty object payload.
    pub fn new(event_type: impl Into<String>, session_id: impl Into<RecordId>) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: session_id.into(),
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use atelier_events::bus::{event_types, EventBus, StudioEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(StudioEvent::new(event_types::VARIATIONS_RELOADED, "S1"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<StudioEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer wraps.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: StudioEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            StudioEvent::new(event_types::VARIATION_ENQUEUED, "S1")
                .with_payload(serde_json::json!({"job_type": "regenerate", "count": 2})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "variation.enqueued");
        assert_eq!(received.session_id, "S1");
        assert_eq!(received.payload["count"], 2);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(StudioEvent::new(event_types::SESSION_UPDATED, "S1"));

        assert_eq!(rx1.recv().await.unwrap().event_type, "session.updated");
        assert_eq!(rx2.recv().await.unwrap().event_type, "session.updated");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(StudioEvent::new(event_types::SESSION_LOAD_FAILED, "S1"));
    }

    #[test]
    fn new_event_has_object_payload() {
        let event = StudioEvent::new(event_types::VARIATIONS_RELOADED, "S9");
        assert!(event.payload.is_object());
        assert_eq!(event.session_id, "S9");
    }
}
