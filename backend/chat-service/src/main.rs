use std::sync::Arc;

use actix_web::{web, App, HttpServer};

use chat_service::config::Config;
use chat_service::db;
use chat_service::error::AppError;
use chat_service::event::EventBus;
use chat_service::redis_client::RedisClient;
use chat_service::routes::configure_routes;
use chat_service::services::auth_service::AuthService;
use chat_service::services::chat_service::ChatService;
use chat_service::services::session_service::SessionService;
use chat_service::services::sms::SmsClient;
use chat_service::services::storage::StorageService;
use chat_service::state::AppState;
use chat_service::websocket::fanout::spawn_event_fanout;
use chat_service::websocket::ConnectionRegistry;
use chat_service::logging;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();

    let config = Arc::new(Config::from_env()?);

    let pool = db::init_pool(&config.database_url).await?;
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::Config(format!("migration failed: {e}")))?;

    let redis = RedisClient::connect(&config.redis_url).await?;

    let sessions = SessionService::new(redis.clone(), config.session_ttl_seconds);
    let sms = config.sms.clone().map(SmsClient::new);
    let auth = AuthService::new(
        pool.clone(),
        redis.clone(),
        sessions,
        sms,
        config.auth_code.clone(),
    );

    let storage = match config.storage.clone() {
        Some(settings) => Some(StorageService::from_settings(settings).await),
        None => None,
    };

    let bus = EventBus::new(256);
    let registry = ConnectionRegistry::new();
    let chats = ChatService::new(pool.clone(), config.chat_page.clone(), bus.clone(), storage);

    let _fanout = spawn_event_fanout(bus.clone(), registry.clone());

    let state = AppState {
        db: pool,
        redis,
        config: config.clone(),
        auth,
        chats,
        bus,
        registry,
    };

    tracing::info!(port = config.port, "chat service listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
    })
    .bind(("0.0.0.0", config.port))
    .map_err(|e| AppError::StartServer(e.to_string()))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(e.to_string()))
}
