use actix_web::{delete, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::services::auth_service::CreateSessionOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub phone: String,
    pub code: Option<String>,
    /// Create the account on first login instead of rejecting unknown phones.
    #[serde(default)]
    pub force: bool,
}

/// Phone login. Without `code` this sends a verification SMS; with `code` it
/// validates and returns a bearer token.
#[post("/auth/session")]
pub async fn create_session(
    state: web::Data<AppState>,
    body: web::Json<CreateSessionRequest>,
) -> AppResult<HttpResponse> {
    let outcome = state
        .auth
        .create_session(&body.phone, body.code.as_deref(), body.force)
        .await?;

    Ok(match outcome {
        CreateSessionOutcome::CodeSent => HttpResponse::Ok().json(json!({ "code": "code_sent" })),
        CreateSessionOutcome::Authorized { token } => {
            HttpResponse::Ok().json(json!({ "code": "authorized", "token": token }))
        }
    })
}

/// Logout: revoke the caller's session.
#[delete("/auth/session")]
pub async fn delete_session(
    state: web::Data<AppState>,
    user: AuthUser,
) -> AppResult<HttpResponse> {
    state.auth.sessions().delete(user.id).await?;
    Ok(HttpResponse::NoContent().finish())
}
