pub mod chat;
pub mod message;

pub use chat::{ChatDetail, ChatList, ChatListItem, PostSummary, UserProfile};
pub use message::{Message, MessageDto, MessageHistory, MessagePreview, MessageType};
