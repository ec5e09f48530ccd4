//! Event bus for inter-component communication
//!
//! Uses tokio::sync::broadcast for pub/sub pattern. The YNCA adapter
//! publishes here; MQTT republishing and anything else downstream
//! subscribes. Delivery is ordered per subscriber; a slow subscriber that
//! lags past the channel capacity drops the oldest events.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::YncaMessage;
use crate::state::PlaybackState;

/// Event types that can be published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    /// A connection to the receiver was established.
    ReceiverConnected { host: String, port: u16 },
    /// The connection to the receiver was torn down.
    ReceiverDisconnected { host: String, port: u16 },
    /// One successfully parsed protocol line, in arrival order.
    Message { message: YncaMessage },
    /// The derived snapshot changed as a result of a message.
    NowPlayingChanged { state: PlaybackState },
    /// The process is shutting down.
    ShuttingDown { reason: String },
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BusEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus with default capacity
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}
