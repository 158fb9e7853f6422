use rand::rngs::OsRng;
use rand::Rng;
use redis::AsyncCommands;
use sqlx::{Pool, Postgres, Row};

use crate::config::AuthCodeConfig;
use crate::error::{AppError, AppResult};
use crate::redis_client::RedisClient;
use crate::services::nickname;
use crate::services::session_service::SessionService;
use crate::services::sms::SmsClient;
use crate::session::SessionToken;

/// Result of the phone login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateSessionOutcome {
    /// No verification code was supplied; a fresh one was sent.
    CodeSent,
    /// Code checked out; a session was issued.
    Authorized { token: String },
}

/// Phone-verification login: one-time auth codes in the cache plus the
/// orchestration that exchanges a verified code for a session. Owns the
/// `authcode:` key space.
#[derive(Clone)]
pub struct AuthService {
    db: Pool<Postgres>,
    redis: RedisClient,
    sessions: SessionService,
    sms: Option<SmsClient>,
    auth_code: AuthCodeConfig,
}

impl AuthService {
    pub fn new(
        db: Pool<Postgres>,
        redis: RedisClient,
        sessions: SessionService,
        sms: Option<SmsClient>,
        auth_code: AuthCodeConfig,
    ) -> Self {
        Self {
            db,
            redis,
            sessions,
            sms,
            auth_code,
        }
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    fn key(phone: &str) -> String {
        format!("authcode:{phone}")
    }

    /// Generate, store and deliver a verification code. At most one live
    /// code per phone number: resending overwrites the previous entry.
    pub async fn send_auth_code(&self, phone: &str) -> AppResult<String> {
        let code = render_code(
            OsRng.gen_range(0..10u64.pow(self.auth_code.length)),
            self.auth_code.length,
        );

        let mut conn = self.redis.connection();
        conn.set_ex::<_, _, ()>(Self::key(phone), &code, self.auth_code.expire_seconds)
            .await?;

        let message = render_message(
            &self.auth_code.message_format,
            &code,
            self.auth_code.expire_seconds,
        );

        match &self.sms {
            Some(client) => client.send(phone, &message).await?,
            None => tracing::warn!(phone, "sms client not configured, skipping delivery"),
        }

        Ok(code)
    }

    /// Compare against the stored code. A match consumes the entry when
    /// `once` is set. Miss or mismatch is `false`, not an error; guess
    /// rate-limiting is the caller's concern.
    pub async fn validate_auth_code(&self, phone: &str, code: &str, once: bool) -> AppResult<bool> {
        let mut conn = self.redis.connection();
        let stored: Option<String> = conn.get(Self::key(phone)).await?;
        let matched = stored.as_deref() == Some(code);

        if once && matched {
            conn.del::<_, ()>(Self::key(phone)).await?;
        }

        Ok(matched)
    }

    /// Phone login. Without a code, sends one and reports `CodeSent`. With a
    /// code, validates it, resolves (or with `force`, creates) the user and
    /// issues a session.
    pub async fn create_session(
        &self,
        phone: &str,
        code: Option<&str>,
        force: bool,
    ) -> AppResult<CreateSessionOutcome> {
        let Some(code) = code else {
            if let Err(e) = self.send_auth_code(phone).await {
                tracing::warn!(error = %e, "auth code delivery failed");
                return Err(AppError::BadRequest("invalid_phone".into()));
            }
            return Ok(CreateSessionOutcome::CodeSent);
        };

        if !self.validate_auth_code(phone, code, true).await? {
            return Err(AppError::Forbidden("invalid_code".into()));
        }

        let user = sqlx::query("SELECT id, deleted_at FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.db)
            .await?;

        let user_id = match user {
            Some(row) => {
                if row.get::<Option<chrono::DateTime<chrono::Utc>>, _>("deleted_at").is_some() {
                    return Err(AppError::Forbidden("blocked".into()));
                }
                row.get::<i64, _>("id")
            }
            None => {
                if !force {
                    return Err(AppError::NotFound("user_notfound".into()));
                }
                self.create_user(phone).await?
            }
        };

        let token = self.sessions.create(user_id).await?;
        tracing::info!(user_id, "session issued");

        Ok(CreateSessionOutcome::Authorized {
            token: token.token(),
        })
    }

    /// Guard-facing validation: the session must be live and the user must
    /// still exist and not be blocked.
    pub async fn validate(&self, token: &str) -> AppResult<Option<SessionToken>> {
        let Some(token) = self.sessions.validate(token).await? else {
            return Ok(None);
        };

        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = $1 AND deleted_at IS NULL")
                .bind(token.identifier)
                .fetch_one(&self.db)
                .await?;

        Ok((exists > 0).then_some(token))
    }

    async fn create_user(&self, phone: &str) -> AppResult<i64> {
        let nickname = self.unique_nickname().await?;
        let id: i64 =
            sqlx::query_scalar("INSERT INTO users (phone, nickname) VALUES ($1, $2) RETURNING id")
                .bind(phone)
                .bind(&nickname)
                .fetch_one(&self.db)
                .await?;

        tracing::info!(user_id = id, "user auto-created on first login");
        Ok(id)
    }

    /// Widen the numeric suffix until a free nickname turns up.
    async fn unique_nickname(&self) -> AppResult<String> {
        for digits in 0..=6u32 {
            let candidate = nickname::generate(digits);
            let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE nickname = $1")
                .bind(&candidate)
                .fetch_one(&self.db)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(AppError::Internal)
    }
}

fn render_code(value: u64, length: u32) -> String {
    format!("{value:0width$}", width = length as usize)
}

fn render_message(format: &str, code: &str, expire_seconds: u64) -> String {
    format
        .replace("{code}", code)
        .replace("{expire}", &(expire_seconds / 60).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_zero_padded_to_configured_length() {
        assert_eq!(render_code(7, 6), "000007");
        assert_eq!(render_code(123456, 6), "123456");
        assert_eq!(render_code(42, 4), "0042");
    }

    #[test]
    fn message_format_substitutes_code_and_whole_minutes() {
        let message = render_message("code {code}, expires in {expire} min", "1234", 300);
        assert_eq!(message, "code 1234, expires in 5 min");
    }

    #[test]
    fn auth_code_keys_are_namespaced() {
        assert_eq!(AuthService::key("01012345678"), "authcode:01012345678");
    }
}
