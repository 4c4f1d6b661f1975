use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::{OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem, macros::format_description};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    nickname    TEXT NOT NULL UNIQUE,
    avatar_url  TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES profiles(id),
    title       TEXT NOT NULL,
    price       INTEGER NOT NULL CHECK (price >= 0),
    description TEXT,
    location    TEXT,
    status      TEXT NOT NULL DEFAULT 'selling' CHECK (status IN ('selling','reserved','sold')),
    view_count  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS product_images (
    id            TEXT PRIMARY KEY,
    product_id    TEXT NOT NULL REFERENCES products(id),
    image_url     TEXT NOT NULL,
    display_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS chats (
    id          TEXT PRIMARY KEY,
    product_id  TEXT NOT NULL REFERENCES products(id),
    buyer_id    TEXT NOT NULL REFERENCES profiles(id),
    seller_id   TEXT NOT NULL REFERENCES profiles(id),
    created_at  TEXT NOT NULL,
    UNIQUE (product_id, buyer_id, seller_id),
    CHECK (buyer_id <> seller_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY,
    chat_id     TEXT NOT NULL REFERENCES chats(id),
    sender_id   TEXT NOT NULL REFERENCES profiles(id),
    content     TEXT NOT NULL,
    is_read     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages (chat_id, created_at, id);

CREATE TABLE IF NOT EXISTS favorites (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES profiles(id),
    product_id  TEXT NOT NULL REFERENCES products(id),
    created_at  TEXT NOT NULL,
    UNIQUE (user_id, product_id)
);
"#;

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    pub id: String,
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub price: i64,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub view_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProductImage {
    pub id: String,
    pub product_id: String,
    pub image_url: String,
    pub display_order: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Chat {
    pub id: String,
    pub product_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

static TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

/// UTC timestamp, fixed width so string order is chronological order.
pub fn now_timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.microsecond(),
    )
}

pub fn parse_timestamp(ts: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(ts, TIMESTAMP_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Calendar-date prefix of a stored timestamp.
pub fn day_of(ts: &str) -> &str {
    ts.get(..10).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamps_round_trip() {
        let at = datetime!(2026-03-01 08:30:15.000250 UTC);
        let ts = format_timestamp(at);
        assert_eq!(ts, "2026-03-01T08:30:15.000250Z");
        assert_eq!(parse_timestamp(&ts), Some(at));
        assert_eq!(day_of(&ts), "2026-03-01");
    }

    #[test]
    fn timestamp_order_is_string_order() {
        let early = format_timestamp(datetime!(2026-03-01 08:30:15.5 UTC));
        let late = format_timestamp(datetime!(2026-03-01 08:30:16 UTC));
        assert!(early < late);
    }
}
