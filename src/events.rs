//! Line event notifications for role/session observers.
//!
//! Host and peripheral role drivers subscribe here to learn about OTG line
//! state transitions. Delivery is fan-out and fire-and-forget.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Line-level event reported to role observers on every OTG transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEvent {
    /// ID pin grounded: this end sources power.
    IdGround,
    /// VBUS reported valid: this end is the powered peripheral.
    VbusValid,
    /// No session: ID floated or VBUS dropped.
    SessionEnd,
}

/// Broadcast bus carrying [`LineEvent`]s to role observers.
///
/// If there are no active subscribers an event is silently dropped; these
/// are fire-and-forget notifications.
pub struct LineEventBus {
    tx: broadcast::Sender<LineEvent>,
}

impl LineEventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: LineEvent) {
        // send errors only when no subscriber exists, which is fine here
        let _ = self.tx.send(event);
    }

    /// Subscribe to future line events.
    pub fn subscribe(&self) -> broadcast::Receiver<LineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LineEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = LineEventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(LineEvent::IdGround);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, LineEvent::IdGround);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = LineEventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(LineEvent::SessionEnd);

        assert_eq!(rx1.recv().await.unwrap(), LineEvent::SessionEnd);
        assert_eq!(rx2.recv().await.unwrap(), LineEvent::SessionEnd);
    }

    #[test]
    fn test_no_subscribers() {
        let bus = LineEventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        // Publishing without subscribers must not panic
        bus.publish(LineEvent::VbusValid);
    }
}
