use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::config::Config;
use crate::event::EventBus;
use crate::redis_client::RedisClient;
use crate::services::auth_service::AuthService;
use crate::services::chat_service::ChatService;
use crate::websocket::ConnectionRegistry;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub redis: RedisClient,
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub chats: ChatService,
    pub bus: EventBus,
    pub registry: ConnectionRegistry,
}
