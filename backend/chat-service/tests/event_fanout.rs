use std::time::Duration;

use chrono::Utc;

use chat_service::event::{ChatEvent, EventBus};
use chat_service::models::{MessageDto, MessageType};
use chat_service::websocket::fanout::spawn_event_fanout;
use chat_service::websocket::ConnectionRegistry;

fn sample_message(id: i64) -> MessageDto {
    MessageDto {
        message_id: id,
        sender_id: 42,
        content: "hello there".into(),
        kind: MessageType::Text,
        created_at: Utc::now(),
        index: 3,
    }
}

#[tokio::test]
async fn created_messages_reach_only_their_room() {
    let bus = EventBus::new(16);
    let registry = ConnectionRegistry::new();
    let _fanout = spawn_event_fanout(bus.clone(), registry.clone());

    let (_id, mut rx) = registry.add_subscriber(1).await;
    let (_other_id, mut other_rx) = registry.add_subscriber(2).await;

    bus.publish(ChatEvent::MessageCreated {
        chat_id: 1,
        message: sample_message(10),
    });

    let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("fanout should deliver within a second")
        .expect("sender still alive");

    let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(value["type"], "message");
    assert_eq!(value["chat_id"], 1);
    assert_eq!(value["message"]["messageId"], 10);
    assert_eq!(value["message"]["index"], 3);

    assert!(other_rx.try_recv().is_err());
}

#[tokio::test]
async fn every_room_subscriber_receives_the_event() {
    let bus = EventBus::new(16);
    let registry = ConnectionRegistry::new();
    let _fanout = spawn_event_fanout(bus.clone(), registry.clone());

    let (_a, mut rx_a) = registry.add_subscriber(5).await;
    let (_b, mut rx_b) = registry.add_subscriber(5).await;

    bus.publish(ChatEvent::MessageCreated {
        chat_id: 5,
        message: sample_message(77),
    });

    for rx in [&mut rx_a, &mut rx_b] {
        let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(payload.contains("\"messageId\":77"));
    }
}

#[tokio::test]
async fn disconnected_subscriber_is_pruned_on_next_broadcast() {
    let bus = EventBus::new(16);
    let registry = ConnectionRegistry::new();
    let _fanout = spawn_event_fanout(bus.clone(), registry.clone());

    let (_id, rx) = registry.add_subscriber(9).await;
    drop(rx);

    bus.publish(ChatEvent::MessageCreated {
        chat_id: 9,
        message: sample_message(1),
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.subscriber_count(9).await, 0);
}
