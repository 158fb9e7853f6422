use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "image" => MessageType::Image,
            _ => MessageType::Text,
        }
    }
}

/// A persisted message row. Immutable once created.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub kind: MessageType,
    pub created_at: DateTime<Utc>,
}

/// Message as returned to clients, carrying its 0-based chronological
/// position within the chat. The index is derived at read/write time from
/// the chat's total message count and the page offset; it is not persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub message_id: i64,
    pub sender_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub created_at: DateTime<Utc>,
    pub index: i64,
}

impl MessageDto {
    pub fn of(message: Message, index: i64) -> Self {
        Self {
            message_id: message.id,
            sender_id: message.sender_id,
            content: message.content,
            kind: message.kind,
            created_at: message.created_at,
            index,
        }
    }
}

/// Latest message shown in the chat list. No index: computing one would cost
/// a count per chat and the list view does not use it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub message_id: i64,
    pub sender_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHistory {
    pub messages: Vec<MessageDto>,
    pub total_count: i64,
}
