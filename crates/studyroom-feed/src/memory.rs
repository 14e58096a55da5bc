//! Channel-backed in-memory implementation of [`MessageFeed`].
//!
//! Used by the test suites and by embedders that bridge a platform SDK's
//! push callbacks into the subsystem: the SDK callback calls
//! [`InMemoryFeed::push_snapshot`] / [`InMemoryFeed::push_error`] and the
//! subscriber consumes the result through the ordinary trait surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use studyroom_shared::{FeedError, Message, RoomId};

use crate::services::{FeedEvent, FeedSubscription, MessageFeed};

struct RoomListener {
    id: u64,
    tx: mpsc::Sender<FeedEvent>,
}

#[derive(Default)]
struct Registry {
    listeners: HashMap<RoomId, Vec<RoomListener>>,
}

/// Fan-out hub delivering pushed events to every live subscription of a room.
pub struct InMemoryFeed {
    registry: Arc<Mutex<Registry>>,
    next_id: AtomicU64,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Deliver a full ordered snapshot to every subscriber of `room`.
    pub fn push_snapshot(&self, room: &RoomId, messages: Vec<Message>) {
        self.fan_out(room, FeedEvent::Snapshot(messages));
    }

    /// Deliver a feed error to every subscriber of `room`.
    pub fn push_error(&self, room: &RoomId, error: FeedError) {
        self.fan_out(room, FeedEvent::Error(error));
    }

    /// Number of live subscriptions for `room`.
    pub fn subscriber_count(&self, room: &RoomId) -> usize {
        let registry = self.registry.lock().expect("registry lock");
        registry.listeners.get(room).map_or(0, Vec::len)
    }

    /// Wait until at least one subscription for `room` is registered.
    ///
    /// Convenience for tests that await resubscription after a pushed error.
    pub async fn wait_for_subscriber(&self, room: &RoomId) {
        while self.subscriber_count(room) == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }

    fn fan_out(&self, room: &RoomId, event: FeedEvent) {
        let registry = self.registry.lock().expect("registry lock");
        let Some(listeners) = registry.listeners.get(room) else {
            debug!(room = %room, "push with no live subscribers");
            return;
        };
        for listener in listeners {
            // A cancelled-but-not-yet-removed listener just discards.
            let _ = listener.tx.try_send(event.clone());
        }
    }
}

impl Default for InMemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFeed for InMemoryFeed {
    fn subscribe(&self, room: &RoomId, events: mpsc::Sender<FeedEvent>) -> FeedSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let room = *room;

        {
            let mut registry = self.registry.lock().expect("registry lock");
            registry
                .listeners
                .entry(room)
                .or_default()
                .push(RoomListener { id, tx: events });
        }
        debug!(room = %room, listener = id, "feed subscription opened");

        let registry = self.registry.clone();
        FeedSubscription::new(move || {
            let mut registry = registry.lock().expect("registry lock");
            if let Some(listeners) = registry.listeners.get_mut(&room) {
                listeners.retain(|l| l.id != id);
                if listeners.is_empty() {
                    registry.listeners.remove(&room);
                }
            }
            debug!(room = %room, listener = id, "feed subscription released");
        })
    }
}
