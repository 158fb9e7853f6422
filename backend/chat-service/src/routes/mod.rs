use actix_web::{get, web, HttpResponse};

pub mod auth;
pub mod chats;
pub mod wsroute;

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(auth::create_session)
            .service(auth::delete_session)
            .service(
                web::scope("/users/@me/chats")
                    .service(chats::create_chat)
                    .service(chats::list_chats)
                    .service(chats::get_messages)
                    .service(chats::send_message)
                    .service(chats::get_chat)
                    .service(chats::leave_chat),
            )
            .service(web::scope("/chats").service(wsroute::ws_handler)),
    )
    .service(health);
}
