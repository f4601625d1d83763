//! In-memory event store and event bus for fast, deterministic testing.
//!
//! Complements [`crate::InMemoryProjectionStore`] to provide a complete
//! in-memory testing infrastructure for reducers built on event sourcing.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_bus::{EventBus, EventBusError, EventStream};
use composable_rust_core::event_store::{EventStore, EventStoreError};
use composable_rust_core::stream::{StreamId, Version};
use futures::stream;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// In-memory event store for fast, deterministic testing.
///
/// Streams are kept in a `HashMap` guarded by a `RwLock`. Optimistic
/// concurrency is enforced the same way a real store would: the current
/// length of the stream is compared against `expected_version`.
///
/// # Example
///
/// ```
/// use composable_rust_testing::InMemoryEventStore;
/// use composable_rust_core::event_store::EventStore;
/// use composable_rust_core::event::SerializedEvent;
/// use composable_rust_core::stream::{StreamId, Version};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEventStore::new();
/// let stream_id = StreamId::new("order-1");
///
/// let event = SerializedEvent::new("OrderPlaced.v1".to_string(), vec![1, 2, 3], None);
/// let version = store.append_events(stream_id.clone(), Some(Version::new(0)), vec![event]).await?;
/// assert_eq!(version, Version::new(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<StreamId, Vec<SerializedEvent>>>>,
    snapshots: Arc<RwLock<HashMap<StreamId, (Version, Vec<u8>)>>>,
}

impl InMemoryEventStore {
    /// Create a new empty in-memory event store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut streams = self.streams.write().map_err(|e| {
                EventStoreError::DatabaseError(format!("lock poisoned: {e}"))
            })?;
            let entry = streams.entry(stream_id.clone()).or_default();
            let current_version = Version::new(entry.len() as u64);

            if let Some(expected) = expected_version {
                if expected != current_version {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual: current_version,
                    });
                }
            }

            entry.extend(events);
            Ok(Version::new(entry.len() as u64))
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let streams = self.streams.read().map_err(|e| {
                EventStoreError::DatabaseError(format!("lock poisoned: {e}"))
            })?;
            let Some(events) = streams.get(&stream_id) else {
                return Ok(Vec::new());
            };
            let skip = from_version.map_or(0, |v| v.value() as usize);
            Ok(events.iter().skip(skip).cloned().collect())
        })
    }

    fn save_snapshot(
        &self,
        stream_id: StreamId,
        version: Version,
        state: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut snapshots = self.snapshots.write().map_err(|e| {
                EventStoreError::DatabaseError(format!("lock poisoned: {e}"))
            })?;
            snapshots.insert(stream_id, (version, state));
            Ok(())
        })
    }

    fn load_snapshot(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(Version, Vec<u8>)>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let snapshots = self.snapshots.read().map_err(|e| {
                EventStoreError::DatabaseError(format!("lock poisoned: {e}"))
            })?;
            Ok(snapshots.get(&stream_id).cloned())
        })
    }
}

/// In-memory event bus for fast, deterministic testing.
///
/// Publishing to a topic immediately fans the event out to every
/// subscription created for that topic so far. Subscriptions created
/// after a publish will not see events published before them, matching
/// an at-least-once, no-replay delivery model.
///
/// # Example
///
/// ```
/// use composable_rust_testing::InMemoryEventBus;
/// use composable_rust_core::event_bus::EventBus;
/// use composable_rust_core::event::SerializedEvent;
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe(&["order-events"]).await?;
///
/// let event = SerializedEvent::new("OrderPlaced.v1".to_string(), vec![1], None);
/// bus.publish("order-events", &event).await?;
///
/// let received = stream.next().await.unwrap()?;
/// assert_eq!(received.event_type, "OrderPlaced.v1");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    subscribers: Arc<RwLock<HashMap<String, Vec<tokio::sync::mpsc::UnboundedSender<SerializedEvent>>>>>,
    /// Every event ever published, in order. Useful for assertions in tests.
    published: Arc<RwLock<Vec<(String, SerializedEvent)>>>,
}

impl InMemoryEventBus {
    /// Create a new empty in-memory event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return every event published so far, paired with its topic.
    ///
    /// Intended for test assertions (`assert_eq!(bus.published_events().len(), 1)`).
    #[must_use]
    pub fn published_events(&self) -> Vec<(String, SerializedEvent)> {
        self.published.read().map(|p| p.clone()).unwrap_or_default()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.published
                .write()
                .map_err(|e| EventBusError::Other(format!("lock poisoned: {e}")))?
                .push((topic.clone(), event.clone()));

            let subscribers = self
                .subscribers
                .read()
                .map_err(|e| EventBusError::Other(format!("lock poisoned: {e}")))?;
            if let Some(senders) = subscribers.get(&topic) {
                for sender in senders {
                    // Ignore send errors: a dropped receiver just means nobody is
                    // listening on that subscription anymore.
                    let _ = sender.send(event.clone());
                }
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        Box::pin(async move {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let mut subscribers = self
                .subscribers
                .write()
                .map_err(|e| EventBusError::Other(format!("lock poisoned: {e}")))?;
            for topic in topics {
                subscribers.entry(topic).or_default().push(tx.clone());
            }
            let rx_stream = tokio_stream_wrapper(rx);
            Ok(Box::pin(rx_stream) as EventStream)
        })
    }
}

/// Adapts a `tokio::sync::mpsc::UnboundedReceiver` into the `Result`-yielding
/// stream shape `EventBus::subscribe` returns.
fn tokio_stream_wrapper(
    rx: tokio::sync::mpsc::UnboundedReceiver<SerializedEvent>,
) -> impl futures::Stream<Item = Result<SerializedEvent, EventBusError>> {
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn append_and_load_events() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new("order-1");
        let event = SerializedEvent::new("OrderPlaced.v1".to_string(), vec![1, 2, 3], None);

        let version = store
            .append_events(stream_id.clone(), Some(Version::new(0)), vec![event])
            .await
            .unwrap();
        assert_eq!(version, Version::new(1));

        let loaded = store.load_events(stream_id, None).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].event_type, "OrderPlaced.v1");
    }

    #[tokio::test]
    async fn append_detects_concurrency_conflict() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new("order-1");
        let event = SerializedEvent::new("OrderPlaced.v1".to_string(), vec![1], None);

        store
            .append_events(stream_id.clone(), Some(Version::new(0)), vec![event.clone()])
            .await
            .unwrap();

        let result = store
            .append_events(stream_id, Some(Version::new(0)), vec![event])
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn load_events_from_unknown_stream_is_empty() {
        let store = InMemoryEventStore::new();
        let loaded = store
            .load_events(StreamId::new("missing"), None)
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new("order-1");

        assert!(store.load_snapshot(stream_id.clone()).await.unwrap().is_none());

        store
            .save_snapshot(stream_id.clone(), Version::new(5), vec![9, 9, 9])
            .await
            .unwrap();

        let snapshot = store.load_snapshot(stream_id).await.unwrap();
        assert_eq!(snapshot, Some((Version::new(5), vec![9, 9, 9])));
    }

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["order-events"]).await.unwrap();

        let event = SerializedEvent::new("OrderPlaced.v1".to_string(), vec![1], None);
        bus.publish("order-events", &event).await.unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.event_type, "OrderPlaced.v1");
        assert_eq!(bus.published_events().len(), 1);
    }

    #[tokio::test]
    async fn publish_to_unsubscribed_topic_is_not_an_error() {
        let bus = InMemoryEventBus::new();
        let event = SerializedEvent::new("OrderPlaced.v1".to_string(), vec![1], None);
        bus.publish("nobody-listening", &event).await.unwrap();
        assert_eq!(bus.published_events().len(), 1);
    }
}
