use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use palaver_types::events::RoomEvent;
use palaver_types::models::Message;

/// Capacity of each per-room broadcast channel. A subscriber that lags
/// further behind than this misses events and should reload history.
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Fans admitted messages out to WebSocket subscribers, one broadcast
/// channel per room.
///
/// The admission path calls [`publish`](Dispatcher::publish) for every
/// newly admitted message, local or replicated — subscribers cannot
/// tell the two apart, by construction.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    rooms: RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a room's event stream, creating the channel on
    /// first use.
    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<RoomEvent> {
        // A poisoned lock still guards a valid map; recover the guard
        // rather than panic in the admission path.
        let mut rooms = self
            .inner
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push an admitted message to the room's subscribers, if any.
    pub fn publish(&self, message: &Message) {
        let rooms = self
            .inner
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = rooms.get(&message.room_id) {
            let _ = tx.send(RoomEvent::MessageAdmitted(message.clone()));
        }
    }

    /// Number of live subscribers for a room.
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        let rooms = self
            .inner
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        rooms.get(room_id).map_or(0, |tx| tx.receiver_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use palaver_clock::VectorClock;

    fn message(room: &str) -> Message {
        Message {
            message_id: "m1".into(),
            room_id: room.into(),
            sender_id: "a".into(),
            content: "hi".into(),
            vector_clock: VectorClock::from([("a", 1)]),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe("general");

        dispatcher.publish(&message("general"));

        match rx.recv().await.unwrap() {
            RoomEvent::MessageAdmitted(msg) => assert_eq!(msg.room_id, "general"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn survives_a_poisoned_lock() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe("general");

        // Poison the map lock by panicking while holding it.
        let inner = dispatcher.inner.clone();
        let _ = std::thread::spawn(move || {
            let _guard = inner.rooms.write().unwrap();
            panic!("poison");
        })
        .join();

        dispatcher.publish(&message("general"));
        assert!(matches!(
            rx.recv().await.unwrap(),
            RoomEvent::MessageAdmitted(_)
        ));
        assert_eq!(dispatcher.subscriber_count("general"), 1);
    }

    #[tokio::test]
    async fn publish_is_scoped_to_the_room() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe("dev");

        dispatcher.publish(&message("general"));

        assert!(rx.try_recv().is_err());
        assert_eq!(dispatcher.subscriber_count("dev"), 1);
        assert_eq!(dispatcher.subscriber_count("general"), 0);
    }
}
