use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::middleware::auth::bearer_token;
use crate::state::AppState;
use crate::websocket::{ConnectionRegistry, SubscriberId};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub chat_id: String,
    pub token: Option<String>,
}

#[derive(ActixMessage)]
#[rtype(result = "()")]
struct BroadcastMessage(String);

/// One live WebSocket connection, subscribed to a single chat room.
struct WsSession {
    chat_id: i64,
    user_id: i64,
    subscriber_id: SubscriberId,
    registry: ConnectionRegistry,
    /// Taken in `started` and bridged into the actor mailbox.
    rx: Option<UnboundedReceiver<String>>,
    hb: Instant,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(
                    chat_id = act.chat_id,
                    user_id = act.user_id,
                    "websocket heartbeat timed out, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            chat_id = self.chat_id,
            user_id = self.user_id,
            "websocket session started"
        );

        self.hb(ctx);

        // Bridge the room channel to the actor mailbox. The forwarding task
        // ends when the registry drops the sender or the actor stops.
        if let Some(mut rx) = self.rx.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    addr.do_send(BroadcastMessage(payload));
                }
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            chat_id = self.chat_id,
            user_id = self.user_id,
            "websocket session stopped"
        );

        let registry = self.registry.clone();
        let chat_id = self.chat_id;
        let subscriber_id = self.subscriber_id;
        actix::spawn(async move {
            registry.remove_subscriber(chat_id, subscriber_id).await;
        });
    }
}

impl Handler<BroadcastMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: BroadcastMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) => {
                // Delivery is one-way; clients send messages over HTTP.
                tracing::debug!(chat_id = self.chat_id, "ignoring inbound text frame");
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(?reason, "websocket close received");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Upgrade to a chat room subscription. The token comes from the `token`
/// query parameter or the `Authorization` header; the caller must be a
/// participant of the chat.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    let token = params.token.clone().or_else(|| bearer_token(&req));
    let Some(token) = token else {
        return Ok(HttpResponse::Unauthorized().finish());
    };

    let session = match state.auth.validate(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => return Ok(HttpResponse::Unauthorized().finish()),
        Err(e) => {
            tracing::error!(error = %e, "websocket auth check failed");
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let Ok(chat_id) = params.chat_id.parse::<i64>() else {
        return Ok(HttpResponse::BadRequest().finish());
    };

    match state.chats.is_member(session.identifier, chat_id).await {
        Ok(true) => {}
        Ok(false) => return Ok(HttpResponse::Forbidden().finish()),
        Err(e) => {
            tracing::error!(error = %e, "websocket membership check failed");
            return Ok(HttpResponse::InternalServerError().finish());
        }
    }

    let (subscriber_id, rx) = state.registry.add_subscriber(chat_id).await;

    ws::start(
        WsSession {
            chat_id,
            user_id: session.identifier,
            subscriber_id,
            registry: state.registry.clone(),
            rx: Some(rx),
            hb: Instant::now(),
        },
        &req,
        stream,
    )
}
