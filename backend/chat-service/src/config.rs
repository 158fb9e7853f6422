use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct AuthCodeConfig {
    pub length: u32,
    pub expire_seconds: u64,
    pub message_format: String,
}

#[derive(Debug, Clone)]
pub struct ChatPageConfig {
    /// Chats per page in the chat list.
    pub chat: i64,
    /// Messages per page in the message history.
    pub message: i64,
}

#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub service_id: String,
    pub access_key: String,
    pub secret_key: String,
    pub calling_number: String,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    /// Sessions persist until logout or overwrite unless a TTL is configured.
    pub session_ttl_seconds: Option<u64>,
    pub auth_code: AuthCodeConfig,
    pub chat_page: ChatPageConfig,
    pub sms: Option<SmsSettings>,
    pub storage: Option<StorageSettings>,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env_parse("PORT", 3000);
        let session_ttl_seconds = env::var("SESSION_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok());

        let auth_code = AuthCodeConfig {
            length: env_parse("AUTH_CODE_LENGTH", 6),
            expire_seconds: env_parse("AUTH_CODE_TTL_SECONDS", 300),
            message_format: env::var("AUTH_CODE_MESSAGE_FORMAT").unwrap_or_else(|_| {
                "Your verification code is {code}. It expires in {expire} minutes.".into()
            }),
        };

        let chat_page = ChatPageConfig {
            chat: env_parse("CHAT_PAGE_SIZE", 10),
            message: env_parse("MESSAGE_PAGE_SIZE", 50),
        };

        let sms = match env::var("SENS_SERVICE_ID") {
            Ok(service_id) if !service_id.trim().is_empty() => {
                let access_key = env::var("SENS_ACCESS_KEY")
                    .map_err(|_| crate::error::AppError::Config("SENS_ACCESS_KEY missing".into()))?;
                let secret_key = env::var("SENS_SECRET_KEY")
                    .map_err(|_| crate::error::AppError::Config("SENS_SECRET_KEY missing".into()))?;
                let calling_number = env::var("SENS_CALLING_NUMBER").map_err(|_| {
                    crate::error::AppError::Config("SENS_CALLING_NUMBER missing".into())
                })?;
                Some(SmsSettings {
                    service_id,
                    access_key,
                    secret_key,
                    calling_number,
                })
            }
            _ => None,
        };

        let storage = match env::var("S3_BUCKET") {
            Ok(bucket) if !bucket.trim().is_empty() => Some(StorageSettings {
                bucket,
                base_url: env::var("S3_BASE_URL").ok(),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            redis_url,
            port,
            session_ttl_seconds,
            auth_code,
            chat_page,
            sms,
            storage,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://127.0.0.1:6379/0".into(),
            port: 3000,
            session_ttl_seconds: None,
            auth_code: AuthCodeConfig {
                length: 6,
                expire_seconds: 300,
                message_format: "code {code}, {expire} min".into(),
            },
            chat_page: ChatPageConfig { chat: 10, message: 50 },
            sms: None,
            storage: None,
        }
    }
}
