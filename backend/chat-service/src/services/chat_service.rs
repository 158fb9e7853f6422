//! Chat and message persistence: idempotent chat creation, the aggregated
//! chat list, reversible message pagination and serialized message inserts.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ChatPageConfig;
use crate::error::{AppError, AppResult};
use crate::event::{ChatEvent, EventBus};
use crate::models::{
    ChatDetail, ChatList, ChatListItem, Message, MessageDto, MessageHistory, MessagePreview,
    MessageType, PostSummary, UserProfile,
};
use crate::services::storage::StorageService;

/// Per-chat locks serializing message insertion. The insert and the count
/// that derives the message index must not interleave between writers on
/// the same chat, or two messages can report the same index.
#[derive(Clone, Default)]
pub struct ChatLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // A held guard keeps a second strong reference; count 1 means
            // the lock is idle and can be evicted.
            map.retain(|id, lock| *id == chat_id || Arc::strong_count(lock) > 1);
            map.entry(chat_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_chats(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Which slice of a chat's history a `skip` value addresses.
///
/// `skip` counts back from the newest message: zero means the latest page,
/// and each later request passes the index of the oldest message it already
/// has. Offsets resolve against ascending chronological order so a page
/// never shifts when new messages arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: i64,
    pub latest: bool,
}

impl PageWindow {
    pub fn of(skip: i64, page_size: i64) -> Self {
        if skip <= 0 {
            Self { offset: 0, latest: true }
        } else {
            Self {
                offset: (skip - page_size).max(0),
                latest: false,
            }
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    db: Pool<Postgres>,
    page: ChatPageConfig,
    bus: EventBus,
    storage: Option<StorageService>,
    locks: ChatLocks,
}

impl ChatService {
    pub fn new(
        db: Pool<Postgres>,
        page: ChatPageConfig,
        bus: EventBus,
        storage: Option<StorageService>,
    ) -> Self {
        Self {
            db,
            page,
            bus,
            storage,
            locks: ChatLocks::new(),
        }
    }

    /// Open a chat on a post, or return the existing one. The post author
    /// cannot open a chat on their own post.
    pub async fn create_chat(&self, user_id: i64, post_id: i64) -> AppResult<i64> {
        let author_id: i64 = sqlx::query_scalar(
            "SELECT author_id FROM posts \
             WHERE id = $1 AND status = 'default' AND deleted_at IS NULL",
        )
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("post_notfound".into()))?;

        if author_id == user_id {
            return Err(AppError::InvalidSelfChat);
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT c.id FROM chats c \
             JOIN chat_participants cp ON cp.chat_id = c.id AND cp.user_id = $2 \
             WHERE c.post_id = $1 AND c.deleted_at IS NULL",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        if let Some(chat_id) = existing {
            return Ok(chat_id);
        }

        let mut tx = self.db.begin().await?;
        let chat_id: i64 =
            sqlx::query_scalar("INSERT INTO chats (post_id) VALUES ($1) RETURNING id")
                .bind(post_id)
                .fetch_one(&mut *tx)
                .await?;
        sqlx::query("INSERT INTO chat_participants (chat_id, user_id) VALUES ($1, $2), ($1, $3)")
            .bind(chat_id)
            .bind(user_id)
            .bind(author_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(chat_id, post_id, user_id, "chat created");
        Ok(chat_id)
    }

    /// Single-chat view with post (author included) and participants.
    pub async fn get_chat(&self, user_id: i64, chat_id: i64) -> AppResult<ChatDetail> {
        self.ensure_member(user_id, chat_id).await?;

        let post_id: i64 = sqlx::query_scalar("SELECT post_id FROM chats WHERE id = $1")
            .bind(chat_id)
            .fetch_one(&self.db)
            .await?;

        let post = self
            .post_summaries(&[post_id], true)
            .await?
            .remove(&post_id)
            .ok_or_else(|| AppError::NotFound("post_notfound".into()))?;
        let mut participants = self.participants(&[chat_id]).await?;

        Ok(ChatDetail {
            id: chat_id,
            post,
            participants: participants.remove(&chat_id).unwrap_or_default(),
        })
    }

    /// Aggregated chat list, newest activity first, one page at a time.
    /// Last messages and unread counts are fetched in two batched queries
    /// rather than per chat.
    pub async fn list_chats(&self, user_id: i64, page: i64) -> AppResult<ChatList> {
        let rows = sqlx::query(
            "SELECT c.id, c.post_id, c.created_at, me.last_read_at \
             FROM chats c \
             JOIN chat_participants me ON me.chat_id = c.id AND me.user_id = $1 \
             WHERE c.deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let count = rows.len() as i64;
        let total_pages = (count + self.page.chat - 1) / self.page.chat;

        struct ChatRow {
            id: i64,
            post_id: i64,
            created_at: DateTime<Utc>,
            last_read_at: Option<DateTime<Utc>>,
        }
        let mut chats: Vec<ChatRow> = rows
            .into_iter()
            .map(|r| ChatRow {
                id: r.get("id"),
                post_id: r.get("post_id"),
                created_at: r.get("created_at"),
                last_read_at: r.get("last_read_at"),
            })
            .collect();

        let all_ids: Vec<i64> = chats.iter().map(|c| c.id).collect();
        let mut last_messages = self.last_messages(&all_ids).await?;

        chats.sort_by_key(|c| {
            let activity = last_messages
                .get(&c.id)
                .map(|m| m.created_at)
                .unwrap_or(c.created_at);
            std::cmp::Reverse((activity, c.id))
        });

        let offset = (page.max(0) * self.page.chat) as usize;
        let page: Vec<ChatRow> = chats
            .into_iter()
            .skip(offset)
            .take(self.page.chat as usize)
            .collect();

        let page_ids: Vec<i64> = page.iter().map(|c| c.id).collect();
        let read_marks: Vec<Option<DateTime<Utc>>> =
            page.iter().map(|c| c.last_read_at).collect();
        let post_ids: Vec<i64> = page.iter().map(|c| c.post_id).collect();

        let unread = self.unread_counts(user_id, &page_ids, &read_marks).await?;
        let mut posts = self.post_summaries(&post_ids, false).await?;
        let mut participants = self.participants(&page_ids).await?;

        let items = page
            .into_iter()
            .map(|c| {
                let post = posts
                    .remove(&c.post_id)
                    .ok_or_else(|| AppError::NotFound("post_notfound".into()))?;
                Ok(ChatListItem {
                    id: c.id,
                    post,
                    participants: participants.remove(&c.id).unwrap_or_default(),
                    last_message: last_messages.remove(&c.id),
                    unread_count: unread.get(&c.id).copied().unwrap_or(0),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ChatList {
            count,
            total_pages,
            chats: items,
        })
    }

    /// Paged message history, oldest first within the page, each message
    /// carrying its chronological index. Read-only: acknowledging a read
    /// (moving `last_read_at`) is a separate action.
    pub async fn messages(&self, user_id: i64, chat_id: i64, skip: i64) -> AppResult<MessageHistory> {
        self.ensure_member(user_id, chat_id).await?;

        // The count and the page must agree on what "latest" means, or a
        // concurrent insert shifts the index base between the two reads.
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let total_count = self.message_count(&mut *tx, chat_id).await?;
        let window = PageWindow::of(skip, self.page.message);

        let (rows, base) = if window.latest {
            let mut rows = sqlx::query(
                "SELECT id, chat_id, sender_id, content, type, created_at \
                 FROM messages \
                 WHERE chat_id = $1 AND deleted_at IS NULL \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT $2",
            )
            .bind(chat_id)
            .bind(self.page.message)
            .fetch_all(&mut *tx)
            .await?;
            rows.reverse();
            (rows, (total_count - self.page.message).max(0))
        } else {
            let rows = sqlx::query(
                "SELECT id, chat_id, sender_id, content, type, created_at \
                 FROM messages \
                 WHERE chat_id = $1 AND deleted_at IS NULL \
                 ORDER BY created_at ASC, id ASC \
                 OFFSET $2 LIMIT $3",
            )
            .bind(chat_id)
            .bind(window.offset)
            .bind(self.page.message)
            .fetch_all(&mut *tx)
            .await?;
            (rows, window.offset)
        };
        tx.commit().await?;

        let messages = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| MessageDto::of(message_from_row(&row), base + i as i64))
            .collect();

        Ok(MessageHistory {
            messages,
            total_count,
        })
    }

    /// Persist a text message and publish it on the event bus. The per-chat
    /// lock keeps the insert and the index-deriving count atomic with
    /// respect to other writers on the same chat.
    pub async fn send_message(
        &self,
        user_id: i64,
        chat_id: i64,
        content: String,
        kind: MessageType,
    ) -> AppResult<MessageDto> {
        self.ensure_member(user_id, chat_id).await?;

        let _guard = self.locks.acquire(chat_id).await;

        let mut tx = self.db.begin().await?;
        let row = sqlx::query(
            "INSERT INTO messages (chat_id, sender_id, content, type) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, created_at",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(&content)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let total = self.message_count(&mut *tx, chat_id).await?;
        tx.commit().await?;

        let message = MessageDto {
            message_id: row.get("id"),
            sender_id: user_id,
            content,
            kind,
            created_at: row.get("created_at"),
            index: total - 1,
        };

        self.bus.publish(ChatEvent::MessageCreated {
            chat_id,
            message: message.clone(),
        });
        tracing::debug!(chat_id, message_id = message.message_id, "message stored");

        Ok(message)
    }

    /// Upload an image and persist it as an image message whose content is
    /// the object URL.
    pub async fn send_image(
        &self,
        user_id: i64,
        chat_id: i64,
        data: Vec<u8>,
    ) -> AppResult<MessageDto> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| AppError::Storage("object storage not configured".into()))?;

        self.ensure_member(user_id, chat_id).await?;
        let url = storage.upload_image(data).await?;
        self.send_message(user_id, chat_id, url, MessageType::Image)
            .await
    }

    /// Remove the user from the chat; the last participant out soft-deletes
    /// the chat itself.
    pub async fn leave_chat(&self, user_id: i64, chat_id: i64) -> AppResult<()> {
        self.ensure_member(user_id, chat_id).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM chat_participants WHERE chat_id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_participants WHERE chat_id = $1")
                .bind(chat_id)
                .fetch_one(&mut *tx)
                .await?;
        if remaining == 0 {
            sqlx::query("UPDATE chats SET deleted_at = now() WHERE id = $1")
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(chat_id, user_id, "participant left chat");
        Ok(())
    }

    /// Membership check used by both the HTTP surface and the gateway.
    pub async fn is_member(&self, user_id: i64, chat_id: i64) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_participants cp \
             JOIN chats c ON c.id = cp.chat_id \
             WHERE cp.chat_id = $1 AND cp.user_id = $2 AND c.deleted_at IS NULL",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count > 0)
    }

    async fn ensure_member(&self, user_id: i64, chat_id: i64) -> AppResult<()> {
        if self.is_member(user_id, chat_id).await? {
            Ok(())
        } else {
            // Non-members cannot distinguish a missing chat from a denied one.
            Err(AppError::NotFound("chat_notfound".into()))
        }
    }

    async fn message_count<'e, E>(&self, executor: E, chat_id: i64) -> AppResult<i64>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE chat_id = $1 AND deleted_at IS NULL",
        )
        .bind(chat_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// Latest surviving message per chat, one row each.
    async fn last_messages(&self, chat_ids: &[i64]) -> AppResult<HashMap<i64, MessagePreview>> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT DISTINCT ON (chat_id) chat_id, id, sender_id, content, type, created_at \
             FROM messages \
             WHERE chat_id = ANY($1) AND deleted_at IS NULL \
             ORDER BY chat_id, created_at DESC, id DESC",
        )
        .bind(chat_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.get::<i64, _>("chat_id"),
                    MessagePreview {
                        message_id: r.get("id"),
                        sender_id: r.get("sender_id"),
                        content: r.get("content"),
                        kind: MessageType::from_str(r.get("type")),
                        created_at: r.get("created_at"),
                    },
                )
            })
            .collect())
    }

    /// Unread counts for a page of chats in one pass, pairing each chat with
    /// the caller's read mark via `unnest`.
    async fn unread_counts(
        &self,
        user_id: i64,
        chat_ids: &[i64],
        read_marks: &[Option<DateTime<Utc>>],
    ) -> AppResult<HashMap<i64, i64>> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT m.chat_id, COUNT(*) AS unread \
             FROM messages m \
             JOIN unnest($1::bigint[], $2::timestamptz[]) AS r(chat_id, last_read_at) \
               ON r.chat_id = m.chat_id \
             WHERE m.deleted_at IS NULL \
               AND m.sender_id <> $3 \
               AND (r.last_read_at IS NULL OR m.created_at > r.last_read_at) \
             GROUP BY m.chat_id",
        )
        .bind(chat_ids)
        .bind(read_marks)
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<i64, _>("chat_id"), r.get::<i64, _>("unread")))
            .collect())
    }

    async fn participants(&self, chat_ids: &[i64]) -> AppResult<HashMap<i64, Vec<UserProfile>>> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT cp.chat_id, u.id, u.nickname, u.picture \
             FROM chat_participants cp \
             JOIN users u ON u.id = cp.user_id \
             WHERE cp.chat_id = ANY($1) \
             ORDER BY cp.chat_id, cp.id",
        )
        .bind(chat_ids)
        .fetch_all(&self.db)
        .await?;

        let mut map: HashMap<i64, Vec<UserProfile>> = HashMap::new();
        for r in rows {
            map.entry(r.get("chat_id")).or_default().push(UserProfile {
                id: r.get("id"),
                nickname: r.get("nickname"),
                picture: r.get("picture"),
            });
        }
        Ok(map)
    }

    async fn post_summaries(
        &self,
        post_ids: &[i64],
        with_author: bool,
    ) -> AppResult<HashMap<i64, PostSummary>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT p.id, p.type, p.status, p.title, p.price, \
                    u.id AS author_id, u.nickname AS author_nickname, \
                    u.picture AS author_picture, \
                    (SELECT url FROM post_images i \
                     WHERE i.post_id = p.id ORDER BY i.position LIMIT 1) AS thumbnail \
             FROM posts p \
             JOIN users u ON u.id = p.author_id \
             WHERE p.id = ANY($1)",
        )
        .bind(post_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let author = with_author.then(|| UserProfile {
                    id: r.get("author_id"),
                    nickname: r.get("author_nickname"),
                    picture: r.get("author_picture"),
                });
                (
                    r.get::<i64, _>("id"),
                    PostSummary {
                        id: r.get("id"),
                        author,
                        kind: r.get("type"),
                        status: r.get("status"),
                        thumbnail: r.get("thumbnail"),
                        title: r.get("title"),
                        price: r.get("price"),
                    },
                )
            })
            .collect())
    }
}

fn message_from_row(row: &sqlx::postgres::PgRow) -> Message {
    Message {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        kind: MessageType::from_str(row.get("type")),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn skip_zero_addresses_the_latest_page() {
        let window = PageWindow::of(0, 4);
        assert!(window.latest);
        assert_eq!(window.offset, 0);
    }

    #[test]
    fn skip_steps_back_one_page_at_a_time() {
        // 10 messages, page size 4: skip=6 must yield the window [2, 6).
        let window = PageWindow::of(6, 4);
        assert_eq!(window, PageWindow { offset: 2, latest: false });
    }

    #[test]
    fn skip_smaller_than_page_clamps_to_start() {
        let window = PageWindow::of(2, 4);
        assert_eq!(window, PageWindow { offset: 0, latest: false });
    }

    #[tokio::test]
    async fn chat_locks_serialize_same_chat() {
        let locks = ChatLocks::new();
        let guard = locks.acquire(7).await;

        let locks2 = locks.clone();
        let contended = tokio::spawn(async move {
            let _g = locks2.acquire(7).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contended.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contended)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn idle_chat_locks_are_evicted() {
        let locks = ChatLocks::new();
        let guard = locks.acquire(1).await;
        drop(guard);

        let _held = locks.acquire(2).await;
        assert_eq!(locks.tracked_chats().await, 1);
    }

    #[tokio::test]
    async fn chat_locks_are_independent_across_chats() {
        let locks = ChatLocks::new();
        let _a = locks.acquire(1).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2))
            .await
            .unwrap();
    }
}
