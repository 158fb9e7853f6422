pub mod auth_service;
pub mod chat_service;
pub mod nickname;
pub mod session_service;
pub mod sms;
pub mod storage;
