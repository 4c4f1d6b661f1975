//! Chat-room persistence: room lookup/creation, message send, read state.
//!
//! Every operation takes the pool and the caller identity explicitly; there is
//! no ambient session state below the handler layer.

use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    AppError, AppResult, db,
    db::{Chat, Message},
};

/// One row of the chat list view: the room joined with its product summary,
/// the counterpart profile, the latest message and the unread tally.
#[derive(Debug, Clone, FromRow)]
pub struct RoomListEntry {
    pub chat_id: String,
    pub product_id: String,
    pub product_title: String,
    pub product_price: i64,
    pub product_image: Option<String>,
    pub counterpart_id: String,
    pub counterpart_nickname: String,
    pub last_message: Option<String>,
    pub last_activity: String,
    pub unread_count: i64,
}

/// The room page view: room, product summary and the counterpart's nickname
/// relative to the caller.
#[derive(Debug, Clone, FromRow)]
pub struct RoomDetail {
    pub chat_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub product_title: String,
    pub product_price: i64,
    pub product_status: String,
    pub product_image: Option<String>,
    pub counterpart_nickname: String,
}

/// Returns the room for (product, buyer=caller, seller), creating it if none
/// exists. The UNIQUE constraint on the triple makes this idempotent even when
/// two calls interleave: both inserts funnel into the same row and the
/// reselect returns it.
pub async fn find_or_create_room(
    pool: &SqlitePool,
    product_id: &str,
    seller_id: &str,
    caller: Option<&str>,
) -> AppResult<Chat> {
    let caller = require(caller)?;
    if caller == seller_id {
        return Err(AppError::Invalid(
            "you cannot open a chat on your own listing".to_owned(),
        ));
    }

    let owner: Option<(String,)> = sqlx::query_as("SELECT user_id FROM products WHERE id=?")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    match owner {
        Some((owner,)) if owner == seller_id => {}
        _ => return Err(AppError::NotFound("product")),
    }

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO chats (id,product_id,buyer_id,seller_id,created_at) VALUES (?,?,?,?,?)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(product_id)
    .bind(caller)
    .bind(seller_id)
    .bind(db::now_timestamp())
    .execute(pool)
    .await?;

    let chat: Chat =
        sqlx::query_as("SELECT * FROM chats WHERE product_id=? AND buyer_id=? AND seller_id=?")
            .bind(product_id)
            .bind(caller)
            .bind(seller_id)
            .fetch_one(pool)
            .await?;

    if inserted.rows_affected() > 0 {
        tracing::info!(chat = %chat.id, product = %product_id, "created chat room");
    }
    Ok(chat)
}

/// Every room the caller participates in, most recent activity first.
/// Activity is the last message time, falling back to room creation time.
pub async fn list_rooms_for_user(
    pool: &SqlitePool,
    caller: Option<&str>,
) -> AppResult<Vec<RoomListEntry>> {
    let caller = require(caller)?;

    let rooms = sqlx::query_as::<_, RoomListEntry>(
        r#"
        SELECT c.id AS chat_id,
               p.id AS product_id,
               p.title AS product_title,
               p.price AS product_price,
               (SELECT i.image_url FROM product_images i
                 WHERE i.product_id = p.id
                 ORDER BY i.display_order, i.id LIMIT 1) AS product_image,
               o.id AS counterpart_id,
               o.nickname AS counterpart_nickname,
               (SELECT m.content FROM messages m
                 WHERE m.chat_id = c.id
                 ORDER BY m.created_at DESC, m.id DESC LIMIT 1) AS last_message,
               COALESCE((SELECT m.created_at FROM messages m
                          WHERE m.chat_id = c.id
                          ORDER BY m.created_at DESC, m.id DESC LIMIT 1),
                        c.created_at) AS last_activity,
               (SELECT COUNT(*) FROM messages m
                 WHERE m.chat_id = c.id AND m.is_read = 0 AND m.sender_id <> ?1) AS unread_count
        FROM chats c
        JOIN products p ON p.id = c.product_id
        JOIN profiles o ON o.id = CASE WHEN c.buyer_id = ?1 THEN c.seller_id ELSE c.buyer_id END
        WHERE c.buyer_id = ?1 OR c.seller_id = ?1
        ORDER BY last_activity DESC
        "#,
    )
    .bind(caller)
    .fetch_all(pool)
    .await?;

    Ok(rooms)
}

/// The room's messages in creation order, ties broken by id. Ids are UUIDv7,
/// so the tiebreak is also insertion order and stable across reads.
pub async fn list_messages(
    pool: &SqlitePool,
    chat_id: &str,
    caller: Option<&str>,
) -> AppResult<Vec<Message>> {
    let caller = require(caller)?;
    let chat = get_chat(pool, chat_id).await?;
    ensure_participant(&chat, caller)?;

    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE chat_id=? ORDER BY created_at ASC, id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

/// Inserts a message with `is_read = false` and returns the stored row so the
/// caller can publish it to the live feed.
pub async fn send_message(
    pool: &SqlitePool,
    chat_id: &str,
    caller: Option<&str>,
    content: &str,
) -> AppResult<Message> {
    let caller = require(caller)?;
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::Invalid("message cannot be empty".to_owned()));
    }

    let chat = get_chat(pool, chat_id).await?;
    ensure_participant(&chat, caller)?;

    let message = Message {
        id: Uuid::now_v7().to_string(),
        chat_id: chat.id,
        sender_id: caller.to_owned(),
        content: content.to_owned(),
        is_read: false,
        created_at: db::now_timestamp(),
    };

    sqlx::query("INSERT INTO messages (id,chat_id,sender_id,content,is_read,created_at) VALUES (?,?,?,?,?,?)")
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(message.is_read)
        .bind(&message.created_at)
        .execute(pool)
        .await?;

    Ok(message)
}

/// Flips `is_read` false→true for every message the caller did not send.
/// Silent no-op when the caller is unset or not a participant; safe to invoke
/// redundantly.
pub async fn mark_read(pool: &SqlitePool, chat_id: &str, caller: Option<&str>) -> AppResult<u64> {
    let Some(caller) = caller else {
        return Ok(0);
    };
    let chat: Option<Chat> = sqlx::query_as("SELECT * FROM chats WHERE id=?")
        .bind(chat_id)
        .fetch_optional(pool)
        .await?;
    let Some(chat) = chat else {
        return Ok(0);
    };
    if chat.buyer_id != caller && chat.seller_id != caller {
        return Ok(0);
    }

    let updated =
        sqlx::query("UPDATE messages SET is_read=1 WHERE chat_id=? AND sender_id<>? AND is_read=0")
            .bind(chat_id)
            .bind(caller)
            .execute(pool)
            .await?;

    Ok(updated.rows_affected())
}

/// The room page join shape, with the counterpart resolved against the caller.
pub async fn room_detail(
    pool: &SqlitePool,
    chat_id: &str,
    caller: Option<&str>,
) -> AppResult<RoomDetail> {
    let caller = require(caller)?;
    let chat = get_chat(pool, chat_id).await?;
    ensure_participant(&chat, caller)?;

    let detail = sqlx::query_as::<_, RoomDetail>(
        r#"
        SELECT c.id AS chat_id,
               c.buyer_id,
               c.seller_id,
               p.id AS product_id,
               p.title AS product_title,
               p.price AS product_price,
               p.status AS product_status,
               (SELECT i.image_url FROM product_images i
                 WHERE i.product_id = p.id
                 ORDER BY i.display_order, i.id LIMIT 1) AS product_image,
               o.nickname AS counterpart_nickname
        FROM chats c
        JOIN products p ON p.id = c.product_id
        JOIN profiles o ON o.id = CASE WHEN c.buyer_id = ?2 THEN c.seller_id ELSE c.buyer_id END
        WHERE c.id = ?1
        "#,
    )
    .bind(chat_id)
    .bind(caller)
    .fetch_one(pool)
    .await?;

    Ok(detail)
}

fn require(caller: Option<&str>) -> AppResult<&str> {
    caller.ok_or(AppError::Unauthorized)
}

async fn get_chat(pool: &SqlitePool, chat_id: &str) -> AppResult<Chat> {
    sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id=?")
        .bind(chat_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("chat room"))
}

fn ensure_participant(chat: &Chat, caller: &str) -> AppResult<()> {
    if chat.buyer_id == caller || chat.seller_id == caller {
        Ok(())
    } else {
        Err(AppError::Forbidden("you are not part of this chat room"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth, products};

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();
        pool
    }

    async fn seed(pool: &SqlitePool) -> (String, String, String) {
        let seller = auth::create_profile(pool, Some("seller")).await.unwrap();
        let buyer = auth::create_profile(pool, Some("buyer")).await.unwrap();
        let product = products::create_listing(
            pool,
            Some(&seller.id),
            "camp stove",
            "450",
            Some("barely used"),
            Some("Oslo"),
        )
        .await
        .unwrap();
        (product.id, seller.id, buyer.id)
    }

    #[tokio::test]
    async fn room_lookup_is_idempotent() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;

        let first = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();
        let second = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chats")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn room_creation_rejects_bad_callers() {
        let pool = test_pool().await;
        let (product, seller, _) = seed(&pool).await;

        assert!(matches!(
            find_or_create_room(&pool, &product, &seller, None).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            find_or_create_room(&pool, &product, &seller, Some(&seller)).await,
            Err(AppError::Invalid(_))
        ));
        assert!(matches!(
            find_or_create_room(&pool, "missing", &seller, Some("someone")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_messages_are_rejected_and_not_persisted() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;
        let chat = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();

        for content in ["", "   ", "\n\t "] {
            assert!(matches!(
                send_message(&pool, &chat.id, Some(&buyer), content).await,
                Err(AppError::Invalid(_))
            ));
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn send_requires_room_and_membership() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;
        let stranger = auth::create_profile(&pool, Some("stranger")).await.unwrap();
        let chat = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();

        assert!(matches!(
            send_message(&pool, "nope", Some(&buyer), "hi").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            send_message(&pool, &chat.id, Some(&stranger.id), "hi").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            list_messages(&pool, &chat.id, Some(&stranger.id)).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn sent_content_is_trimmed() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;
        let chat = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();

        let message = send_message(&pool, &chat.id, Some(&buyer), "  hello  ")
            .await
            .unwrap();
        assert_eq!(message.content, "hello");
        assert!(!message.is_read);
    }

    #[tokio::test]
    async fn mark_read_flips_only_counterpart_messages() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;
        let chat = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();

        send_message(&pool, &chat.id, Some(&buyer), "one").await.unwrap();
        send_message(&pool, &chat.id, Some(&seller), "two").await.unwrap();
        send_message(&pool, &chat.id, Some(&buyer), "three").await.unwrap();

        let flipped = mark_read(&pool, &chat.id, Some(&seller)).await.unwrap();
        assert_eq!(flipped, 2);

        for message in list_messages(&pool, &chat.id, Some(&seller)).await.unwrap() {
            if message.sender_id == buyer {
                assert!(message.is_read);
            } else {
                assert!(!message.is_read);
            }
        }

        // redundant invocation is a no-op, as is one from an outsider
        assert_eq!(mark_read(&pool, &chat.id, Some(&seller)).await.unwrap(), 0);
        assert_eq!(mark_read(&pool, &chat.id, None).await.unwrap(), 0);
        let stranger = auth::create_profile(&pool, Some("stranger")).await.unwrap();
        assert_eq!(
            mark_read(&pool, &chat.id, Some(&stranger.id)).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn messages_come_back_in_creation_order_with_id_tiebreak() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;
        let chat = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();

        // two rows sharing one timestamp, inserted out of id order
        let ts = "2026-01-05T10:00:00.000000Z";
        for id in ["b-second", "a-first"] {
            sqlx::query(
                "INSERT INTO messages (id,chat_id,sender_id,content,is_read,created_at) VALUES (?,?,?,?,0,?)",
            )
            .bind(id)
            .bind(&chat.id)
            .bind(&buyer)
            .bind(id)
            .bind(ts)
            .execute(&pool)
            .await
            .unwrap();
        }
        let later = send_message(&pool, &chat.id, Some(&seller), "later").await.unwrap();

        for _ in 0..3 {
            let messages = list_messages(&pool, &chat.id, Some(&buyer)).await.unwrap();
            let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
            assert_eq!(ids, vec!["a-first", "b-second", later.id.as_str()]);
        }
    }

    #[tokio::test]
    async fn room_list_orders_by_activity_and_counts_unread() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;
        let other = auth::create_profile(&pool, Some("other-buyer")).await.unwrap();

        let quiet = find_or_create_room(&pool, &product, &seller, Some(&other.id))
            .await
            .unwrap();
        let busy = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();
        send_message(&pool, &busy.id, Some(&buyer), "hello").await.unwrap();

        let rooms = list_rooms_for_user(&pool, Some(&seller)).await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].chat_id, busy.id);
        assert_eq!(rooms[0].last_message.as_deref(), Some("hello"));
        assert_eq!(rooms[0].unread_count, 1);
        assert_eq!(rooms[0].counterpart_nickname, "buyer");
        assert_eq!(rooms[1].chat_id, quiet.id);
        assert!(rooms[1].last_message.is_none());
        assert_eq!(rooms[1].unread_count, 0);

        // after the seller reads, the buyer side shows no unread either
        mark_read(&pool, &busy.id, Some(&seller)).await.unwrap();
        let rooms = list_rooms_for_user(&pool, Some(&buyer)).await.unwrap();
        assert_eq!(rooms[0].unread_count, 0);
    }

    #[tokio::test]
    async fn room_detail_resolves_counterpart_per_caller() {
        let pool = test_pool().await;
        let (product, seller, buyer) = seed(&pool).await;
        let chat = find_or_create_room(&pool, &product, &seller, Some(&buyer))
            .await
            .unwrap();

        let for_buyer = room_detail(&pool, &chat.id, Some(&buyer)).await.unwrap();
        assert_eq!(for_buyer.counterpart_nickname, "seller");
        assert_eq!(for_buyer.product_title, "camp stove");

        let for_seller = room_detail(&pool, &chat.id, Some(&seller)).await.unwrap();
        assert_eq!(for_seller.counterpart_nickname, "buyer");
    }
}
