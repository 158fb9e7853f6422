//! In-process publish/subscribe between the messaging engine and the
//! realtime gateway.
//!
//! Built on `tokio::sync::broadcast` so the engine never holds a reference
//! to the connection layer. Publishing with no active subscribers is a
//! no-op.

use tokio::sync::broadcast;

use crate::models::MessageDto;

/// Events published on the `chat.message` topic.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    MessageCreated { chat_id: i64, message: MessageDto },
}

pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;
    use chrono::Utc;

    fn sample_event(chat_id: i64) -> ChatEvent {
        ChatEvent::MessageCreated {
            chat_id,
            message: MessageDto {
                message_id: 1,
                sender_id: 2,
                content: "hello".into(),
                kind: MessageType::Text,
                created_at: Utc::now(),
                index: 0,
            },
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(sample_event(9));

        let ChatEvent::MessageCreated { chat_id, message } = rx.recv().await.unwrap();
        assert_eq!(chat_id, 9);
        assert_eq!(message.content, "hello");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(sample_event(3));

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(16);
        bus.publish(sample_event(1));
    }
}
