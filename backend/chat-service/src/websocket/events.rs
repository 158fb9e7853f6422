use serde::Serialize;

use crate::models::MessageDto;

/// Events delivered to realtime clients over a room's connections.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutboundEvent {
    Message { chat_id: i64, message: MessageDto },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;
    use chrono::Utc;

    #[test]
    fn message_event_carries_topic_tag_and_index() {
        let event = WsOutboundEvent::Message {
            chat_id: 4,
            message: MessageDto {
                message_id: 10,
                sender_id: 2,
                content: "hi".into(),
                kind: MessageType::Text,
                created_at: Utc::now(),
                index: 5,
            },
        };

        let value: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["chat_id"], 4);
        assert_eq!(value["message"]["index"], 5);
        assert_eq!(value["message"]["messageId"], 10);
    }
}
