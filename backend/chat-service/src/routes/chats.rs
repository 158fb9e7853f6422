use actix_multipart::Multipart;
use actix_web::{delete, get, post, web, HttpResponse};
use futures_util::StreamExt as _;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::MessageType;
use crate::state::AppState;

const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub post_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: i64,
}

#[derive(Debug, Deserialize)]
pub struct SkipQuery {
    #[serde(default)]
    pub skip: i64,
}

#[post("")]
pub async fn create_chat(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CreateChatRequest>,
) -> AppResult<HttpResponse> {
    let chat_id = state.chats.create_chat(user.id, body.post_id).await?;
    Ok(HttpResponse::Created().json(json!({ "chatId": chat_id })))
}

#[get("")]
pub async fn list_chats(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<PageQuery>,
) -> AppResult<HttpResponse> {
    let list = state.chats.list_chats(user.id, query.page).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/{chat_id}")]
pub async fn get_chat(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let detail = state.chats.get_chat(user.id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[delete("/{chat_id}")]
pub async fn leave_chat(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    state.chats.leave_chat(user.id, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/{chat_id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i64>,
    query: web::Query<SkipQuery>,
) -> AppResult<HttpResponse> {
    let history = state
        .chats
        .messages(user.id, path.into_inner(), query.skip)
        .await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Send a message. Multipart with exactly one of two fields: `message`
/// (text body) or `picture` (image bytes, capped at 5 MiB).
#[post("/{chat_id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i64>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let chat_id = path.into_inner();
    let mut text: Option<String> = None;
    let mut picture: Option<Vec<u8>> = None;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|_| AppError::BadRequest("invalid_multipart".into()))?;
        let name = field.name().to_string();

        let mut buf = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|_| AppError::BadRequest("invalid_multipart".into()))?;
            if buf.len() + chunk.len() > MAX_IMAGE_BYTES {
                return Err(AppError::BadRequest("payload_too_large".into()));
            }
            buf.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "message" => {
                text = Some(
                    String::from_utf8(buf)
                        .map_err(|_| AppError::BadRequest("invalid_message".into()))?,
                )
            }
            "picture" => picture = Some(buf),
            _ => {}
        }
    }

    let message = match (text, picture) {
        (Some(content), None) if !content.trim().is_empty() => {
            state
                .chats
                .send_message(user.id, chat_id, content, MessageType::Text)
                .await?
        }
        (None, Some(data)) if !data.is_empty() => {
            state.chats.send_image(user.id, chat_id, data).await?
        }
        _ => return Err(AppError::BadRequest("invalid_message".into())),
    };

    Ok(HttpResponse::Created().json(message))
}
