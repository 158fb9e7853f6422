use serde::Serialize;

use super::MessagePreview;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub nickname: String,
    pub picture: Option<String>,
}

/// Post summary embedded in chat payloads. The author is present on the
/// detail view and omitted from the list view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserProfile>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetail {
    pub id: i64,
    pub post: PostSummary,
    pub participants: Vec<UserProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListItem {
    pub id: i64,
    pub post: PostSummary,
    pub participants: Vec<UserProfile>,
    pub last_message: Option<MessagePreview>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatList {
    pub count: i64,
    pub total_pages: i64,
    pub chats: Vec<ChatListItem>,
}
