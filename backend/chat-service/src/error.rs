use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("chat creator is the post author")]
    InvalidSelfChat,

    #[error("malformed session token")]
    MalformedToken,

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Stable machine-readable code rendered in the JSON error body.
    pub fn code(&self) -> &str {
        match self {
            AppError::BadRequest(code) => code,
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(code) => code,
            AppError::NotFound(code) => code,
            AppError::InvalidSelfChat => "self_chat",
            AppError::MalformedToken => "malformed_token",
            AppError::DeliveryFailed(_) => "delivery_failed",
            _ => "internal_error",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("not_found".into()),
            other => AppError::Database(other),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidSelfChat => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::MalformedToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "code": self.code() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn business_codes_surface_in_body() {
        assert_eq!(AppError::Forbidden("invalid_code".into()).code(), "invalid_code");
        assert_eq!(AppError::BadRequest("invalid_phone".into()).code(), "invalid_phone");
        assert_eq!(AppError::InvalidSelfChat.code(), "self_chat");
    }

    #[test]
    fn infrastructure_errors_do_not_leak_details() {
        let err = AppError::Database(sqlx::Error::PoolClosed);
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
