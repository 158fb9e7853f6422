//! Chat flows against a live database.
//!
//! Gated on `TEST_DATABASE_URL` (falling back to `DATABASE_URL`); without
//! one each test skips. Tests share one database, so they serialize on a
//! global lock and truncate state up front.

use once_cell::sync::Lazy;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;

use chat_service::config::ChatPageConfig;
use chat_service::db::MIGRATOR;
use chat_service::error::AppError;
use chat_service::event::EventBus;
use chat_service::models::MessageType;
use chat_service::services::chat_service::ChatService;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .ok()?;
    MIGRATOR.run(&pool).await.ok()?;
    sqlx::query(
        "TRUNCATE messages, chat_participants, chats, post_images, posts, users \
         RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .ok()?;
    Some(pool)
}

fn service(pool: &PgPool) -> ChatService {
    ChatService::new(
        pool.clone(),
        ChatPageConfig { chat: 2, message: 4 },
        EventBus::new(16),
        None,
    )
}

async fn insert_user(pool: &PgPool, phone: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO users (phone, nickname) VALUES ($1, $1) RETURNING id")
        .bind(phone)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_post(pool: &PgPool, author_id: i64, status: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO posts (author_id, status) VALUES ($1, $2) RETURNING id")
        .bind(author_id)
        .bind(status)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn rewind_read_mark(pool: &PgPool, chat_id: i64, user_id: i64) {
    sqlx::query(
        "UPDATE chat_participants SET last_read_at = now() - interval '1 hour' \
         WHERE chat_id = $1 AND user_id = $2",
    )
    .bind(chat_id)
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn create_chat_is_idempotent_per_post_and_buyer() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        eprintln!("no test database configured, skipping");
        return;
    };
    let chats = service(&pool);

    let seller = insert_user(&pool, "010-1001").await;
    let buyer = insert_user(&pool, "010-1002").await;
    let post = insert_post(&pool, seller, "default").await;

    let first = chats.create_chat(buyer, post).await.unwrap();
    let second = chats.create_chat(buyer, post).await.unwrap();
    assert_eq!(first, second);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn create_chat_requires_an_active_post() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        eprintln!("no test database configured, skipping");
        return;
    };
    let chats = service(&pool);

    let seller = insert_user(&pool, "010-2001").await;
    let buyer = insert_user(&pool, "010-2002").await;

    let sold = insert_post(&pool, seller, "done").await;
    let err = chats.create_chat(buyer, sold).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let live = insert_post(&pool, seller, "default").await;
    assert!(chats.create_chat(buyer, live).await.is_ok());
    assert!(matches!(
        chats.create_chat(seller, live).await.unwrap_err(),
        AppError::InvalidSelfChat
    ));
}

#[tokio::test]
async fn last_leaver_soft_deletes_the_chat() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        eprintln!("no test database configured, skipping");
        return;
    };
    let chats = service(&pool);

    let seller = insert_user(&pool, "010-3001").await;
    let buyer = insert_user(&pool, "010-3002").await;
    let post = insert_post(&pool, seller, "default").await;
    let chat_id = chats.create_chat(buyer, post).await.unwrap();

    chats.leave_chat(buyer, chat_id).await.unwrap();
    chats.leave_chat(seller, chat_id).await.unwrap();

    let deleted: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT deleted_at FROM chats WHERE id = $1")
            .bind(chat_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(deleted.is_some());

    assert!(matches!(
        chats.get_chat(seller, chat_id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        chats.messages(seller, chat_id, 0).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert_eq!(chats.list_chats(buyer, 0).await.unwrap().count, 0);
}

#[tokio::test]
async fn unread_counts_follow_sender_and_read_mark() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        eprintln!("no test database configured, skipping");
        return;
    };
    let chats = service(&pool);

    let seller = insert_user(&pool, "010-4001").await;
    let buyer = insert_user(&pool, "010-4002").await;
    let post = insert_post(&pool, seller, "default").await;
    let chat_id = chats.create_chat(buyer, post).await.unwrap();
    rewind_read_mark(&pool, chat_id, buyer).await;

    chats
        .send_message(seller, chat_id, "first".into(), MessageType::Text)
        .await
        .unwrap();
    chats
        .send_message(seller, chat_id, "second".into(), MessageType::Text)
        .await
        .unwrap();

    let list = chats.list_chats(buyer, 0).await.unwrap();
    assert_eq!(list.chats[0].unread_count, 2);
    assert_eq!(list.chats[0].last_message.as_ref().unwrap().content, "second");

    // Fetching history does not acknowledge the read.
    chats.messages(buyer, chat_id, 0).await.unwrap();
    let list = chats.list_chats(buyer, 0).await.unwrap();
    assert_eq!(list.chats[0].unread_count, 2);

    // The reader's own messages never count as unread for them.
    chats
        .send_message(buyer, chat_id, "reply".into(), MessageType::Text)
        .await
        .unwrap();
    let list = chats.list_chats(buyer, 0).await.unwrap();
    assert_eq!(list.chats[0].unread_count, 2);

    sqlx::query(
        "UPDATE chat_participants SET last_read_at = now() \
         WHERE chat_id = $1 AND user_id = $2",
    )
    .bind(chat_id)
    .bind(buyer)
    .execute(&pool)
    .await
    .unwrap();
    let list = chats.list_chats(buyer, 0).await.unwrap();
    assert_eq!(list.chats[0].unread_count, 0);
}

#[tokio::test]
async fn chat_list_pages_by_page_number() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        eprintln!("no test database configured, skipping");
        return;
    };
    let chats = service(&pool);

    let seller = insert_user(&pool, "010-5001").await;
    let buyer = insert_user(&pool, "010-5002").await;
    let mut chat_ids = Vec::new();
    for _ in 0..3 {
        let post = insert_post(&pool, seller, "default").await;
        chat_ids.push(chats.create_chat(buyer, post).await.unwrap());
    }

    let page0 = chats.list_chats(buyer, 0).await.unwrap();
    assert_eq!(page0.count, 3);
    assert_eq!(page0.total_pages, 2);
    assert_eq!(page0.chats.len(), 2);

    let page1 = chats.list_chats(buyer, 1).await.unwrap();
    assert_eq!(page1.chats.len(), 1);
    // Newest activity first: the oldest chat lands on the last page.
    assert_eq!(page1.chats[0].id, chat_ids[0]);
}

#[tokio::test]
async fn history_pages_carry_chronological_indexes() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        eprintln!("no test database configured, skipping");
        return;
    };
    let chats = service(&pool);

    let seller = insert_user(&pool, "010-6001").await;
    let buyer = insert_user(&pool, "010-6002").await;
    let post = insert_post(&pool, seller, "default").await;
    let chat_id = chats.create_chat(buyer, post).await.unwrap();

    for i in 0..6 {
        chats
            .send_message(seller, chat_id, format!("m{i}"), MessageType::Text)
            .await
            .unwrap();
    }

    // Page size 4: skip=0 is the latest page, m2..m5 at indexes 2..5.
    let latest = chats.messages(buyer, chat_id, 0).await.unwrap();
    assert_eq!(latest.total_count, 6);
    let got: Vec<(String, i64)> = latest
        .messages
        .iter()
        .map(|m| (m.content.clone(), m.index))
        .collect();
    assert_eq!(
        got,
        vec![
            ("m2".into(), 2),
            ("m3".into(), 3),
            ("m4".into(), 4),
            ("m5".into(), 5)
        ]
    );

    // Stepping back from index 2 clamps to the start of the history.
    let older = chats.messages(buyer, chat_id, 2).await.unwrap();
    let got: Vec<(String, i64)> = older
        .messages
        .iter()
        .map(|m| (m.content.clone(), m.index))
        .collect();
    assert_eq!(
        got,
        vec![
            ("m0".into(), 0),
            ("m1".into(), 1),
            ("m2".into(), 2),
            ("m3".into(), 3)
        ]
    );
}
