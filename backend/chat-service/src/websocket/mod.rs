use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod fanout;

/// Unique identifier for a live connection's room subscription.
///
/// Each WebSocket connection gets one when it joins a room, so the exact
/// subscription can be released when the connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

/// Room registry for live connections.
///
/// Maps a chat id to the connections currently subscribed to that chat's
/// events. A room may hold many connections across many users and devices.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<i64, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room. Returns the subscription id (needed for cleanup) and the
    /// channel on which broadcasts for this room arrive.
    pub async fn add_subscriber(&self, chat_id: i64) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        guard.entry(chat_id).or_default().push(Subscriber {
            id: subscriber_id,
            sender: tx,
        });

        tracing::debug!(
            chat_id,
            subscribers = guard.get(&chat_id).map(|v| v.len()).unwrap_or(0),
            "subscriber joined room"
        );

        (subscriber_id, rx)
    }

    /// Release a single subscription. Must run when a connection closes or
    /// the sender leaks until the next broadcast prunes it.
    pub async fn remove_subscriber(&self, chat_id: i64, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(&chat_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(&chat_id);
            }
        }
    }

    /// Deliver a payload to every connection in the room, pruning dead
    /// senders as it goes.
    pub async fn broadcast(&self, chat_id: i64, payload: String) {
        let mut guard = self.inner.write().await;
        if let Some(subscribers) = guard.get_mut(&chat_id) {
            subscribers.retain(|subscriber| subscriber.sender.send(payload.clone()).is_ok());
        }
    }

    pub async fn subscriber_count(&self, chat_id: i64) -> usize {
        let guard = self.inner.read().await;
        guard.get(&chat_id).map(|v| v.len()).unwrap_or(0)
    }
}
