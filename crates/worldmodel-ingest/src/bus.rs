//! Map-update bus.
//!
//! A single [`tokio::sync::broadcast`] lane carrying [`MapUpdate`]s from
//! whatever produces map content (a sensor bridge, the interactive shell) to
//! one or more [`MapListener`](crate::listener::MapListener)s.  Every
//! subscriber receives every update; a subscriber that falls behind loses
//! the oldest updates and keeps going.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::error::IngestError;

/// Default channel capacity (number of buffered updates before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 64;

/// One map snapshot received on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapUpdate {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    /// Channel the map arrived on, e.g. `/map`.
    pub topic: String,
    /// Message type name, used as the descriptor type.
    pub msg_type: String,
    /// Coordinate frame of the map; empty when unknown.
    #[serde(default)]
    pub frame_id: String,
    pub data: serde_json::Value,
}

impl MapUpdate {
    pub fn new(topic: impl Into<String>, msg_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            topic: topic.into(),
            msg_type: msg_type.into(),
            frame_id: String::new(),
            data,
        }
    }

    /// Build an update from a serialized payload.
    pub fn from_json(
        topic: impl Into<String>,
        msg_type: impl Into<String>,
        raw: &str,
    ) -> Result<Self, IngestError> {
        Ok(Self::new(topic, msg_type, serde_json::from_str(raw)?))
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }
}

/// Shared map-update bus.  Clones share the same channel.
#[derive(Clone, Debug)]
pub struct MapBus {
    sender: broadcast::Sender<MapUpdate>,
}

impl MapBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `update` to every subscriber.
    ///
    /// Returns the number of subscribers handed the update, or
    /// [`IngestError::NoListeners`] when nobody is subscribed.
    pub fn publish(&self, update: MapUpdate) -> Result<usize, IngestError> {
        self.sender
            .send(update)
            .map_err(|broadcast::error::SendError(update)| IngestError::NoListeners(update.topic))
    }

    pub fn subscribe(&self) -> MapSubscriber {
        MapSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MapBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of a [`MapBus`].
pub struct MapSubscriber {
    receiver: broadcast::Receiver<MapUpdate>,
}

impl MapSubscriber {
    /// Wait for the next update.
    ///
    /// Returns `None` once every [`MapBus`] clone has been dropped.
    pub async fn recv(&mut self) -> Option<MapUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "map subscriber lagged; oldest updates dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = MapBus::default();
        let mut sub = bus.subscribe();

        let update = MapUpdate::new("/map", "grid", json!({"w": 10})).with_frame_id("map");
        assert_eq!(bus.publish(update.clone())?, 1);

        let received = sub.recv().await.ok_or("no update received")?;
        assert_eq!(received, update);
        Ok(())
    }

    #[tokio::test]
    async fn every_subscriber_receives_every_update() -> Result<(), Box<dyn std::error::Error>> {
        let bus = MapBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let update = MapUpdate::new("/map", "grid", json!(null));
        bus.publish(update.clone())?;

        assert_eq!(a.recv().await.ok_or("a missed")?.id, update.id);
        assert_eq!(b.recv().await.ok_or("b missed")?.id, update.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_an_error() {
        let bus = MapBus::default();
        let err = bus.publish(MapUpdate::new("/map", "grid", json!({}))).unwrap_err();
        assert!(matches!(err, IngestError::NoListeners(topic) if topic == "/map"));
    }

    #[test]
    fn from_json_rejects_malformed_payload() {
        let err = MapUpdate::from_json("/map", "grid", "{w: 10").unwrap_err();
        assert!(matches!(err, IngestError::Payload(_)));
        let ok = MapUpdate::from_json("/map", "grid", r#"{"w": 10}"#).unwrap();
        assert_eq!(ok.data, json!({"w": 10}));
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_to_newest() {
        let bus = MapBus::new(4);
        let mut sub = bus.subscribe();
        for i in 0..16 {
            bus.publish(MapUpdate::new("/map", "grid", json!(i))).unwrap();
        }

        // The first four retained updates are 12..16.
        let first = sub.recv().await.unwrap();
        assert_eq!(first.data, json!(12));
    }

    #[tokio::test]
    async fn recv_returns_none_when_bus_dropped() {
        let bus = MapBus::default();
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
