//! Typed "data changed" broadcast
//!
//! Flows publish after a successful write; fetchers subscribe and refetch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 64;

/// What kind of write changed on-chain state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshAction {
    Purchase,
    Claim,
}

/// Broadcast payload: `{ action, timestamp }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataChanged {
    pub action: RefreshAction,
    pub timestamp: DateTime<Utc>,
}

impl DataChanged {
    pub fn now(action: RefreshAction) -> Self {
        Self {
            action,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DataChanged>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a data-changed event. Having no subscribers is not an error.
    pub fn publish(&self, action: RefreshAction) -> DataChanged {
        let event = DataChanged::now(action);
        let receivers = self.tx.send(event.clone()).unwrap_or(0);
        debug!(action = ?action, receivers, "Published data-changed event");
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_event() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let sent = bus.publish(RefreshAction::Purchase);

        assert_eq!(a.recv().await.unwrap(), sent);
        assert_eq!(b.recv().await.unwrap().action, RefreshAction::Purchase);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        let event = bus.publish(RefreshAction::Claim);
        assert_eq!(event.action, RefreshAction::Claim);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_payload_wire_format() {
        let json = serde_json::to_value(DataChanged::now(RefreshAction::Claim)).unwrap();
        assert_eq!(json["action"], "claim");
        assert!(json["timestamp"].is_string());
    }
}
