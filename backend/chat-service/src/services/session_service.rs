use rand::rngs::OsRng;
use rand::RngCore;
use redis::AsyncCommands;

use crate::error::AppResult;
use crate::redis_client::RedisClient;
use crate::session::SessionToken;

/// Cache-backed session store. One active session per user: creating a new
/// session overwrites the stored signature and thereby invalidates the old
/// token. No other component touches the `session:` key space.
#[derive(Clone)]
pub struct SessionService {
    redis: RedisClient,
    ttl_seconds: Option<u64>,
}

impl SessionService {
    pub fn new(redis: RedisClient, ttl_seconds: Option<u64>) -> Self {
        Self { redis, ttl_seconds }
    }

    fn key(identifier: i64) -> String {
        format!("session:{identifier}")
    }

    /// Issue a fresh session for the user and return its bearer token.
    pub async fn create(&self, identifier: i64) -> AppResult<SessionToken> {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let signature = hex::encode(bytes);

        let mut conn = self.redis.connection();
        match self.ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(Self::key(identifier), &signature, ttl).await?,
            None => conn.set::<_, _, ()>(Self::key(identifier), &signature).await?,
        }

        Ok(SessionToken::new(identifier, signature))
    }

    /// Validate a raw token string. Fails closed: a malformed token is
    /// `None`, never an error.
    pub async fn validate(&self, token: &str) -> AppResult<Option<SessionToken>> {
        match SessionToken::parse(token) {
            Ok(token) => self.validate_token(token).await,
            Err(_) => Ok(None),
        }
    }

    /// Validate an already-parsed token against the stored signature.
    pub async fn validate_token(&self, token: SessionToken) -> AppResult<Option<SessionToken>> {
        let mut conn = self.redis.connection();
        let stored: Option<String> = conn.get(Self::key(token.identifier)).await?;

        Ok(match stored {
            Some(signature)
                if constant_time_eq(signature.as_bytes(), token.signature.as_bytes()) =>
            {
                Some(token)
            }
            _ => None,
        })
    }

    /// Revoke the user's session (logout / force-invalidate).
    pub async fn delete(&self, identifier: i64) -> AppResult<()> {
        let mut conn = self.redis.connection();
        conn.del::<_, ()>(Self::key(identifier)).await?;
        Ok(())
    }

    /// Read-only lookup without signature comparison, for diagnostics.
    pub async fn get(&self, identifier: i64) -> AppResult<Option<SessionToken>> {
        let mut conn = self.redis.connection();
        let signature: Option<String> = conn.get(Self::key(identifier)).await?;
        Ok(signature.map(|s| SessionToken::new(identifier, s)))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
