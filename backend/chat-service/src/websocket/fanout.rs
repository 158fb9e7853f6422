use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::event::{ChatEvent, EventBus};
use crate::websocket::events::WsOutboundEvent;
use crate::websocket::ConnectionRegistry;

/// Bridge from the event bus to the connection registry.
///
/// Subscribes for the lifetime of the process and forwards every created
/// message to the room named by its chat id. Delivery is best-effort; a
/// lagged receiver drops the oldest events rather than stalling publishers.
pub fn spawn_event_fanout(bus: EventBus, registry: ConnectionRegistry) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ChatEvent::MessageCreated { chat_id, message }) => {
                    let event = WsOutboundEvent::Message { chat_id, message };
                    match serde_json::to_string(&event) {
                        Ok(payload) => registry.broadcast(chat_id, payload).await,
                        Err(e) => tracing::error!(error = %e, "failed to encode ws event"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event fanout lagged, dropping oldest events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
