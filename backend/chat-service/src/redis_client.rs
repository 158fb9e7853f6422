use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};

/// Thin wrapper around the multiplexed Redis connection manager.
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so every
/// caller just takes a clone per operation.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}
