use axum::{
    debug_handler,
    extract::State,
    response::{Html, IntoResponse, Response},
};
use sqlx::{FromRow, SqlitePool};
use tower_sessions::Session;

use crate::{AppResult, include_res, res, session};

const FEED_LIMIT: i64 = 20;

/// One card of the landing-page feed.
#[derive(Debug, Clone, FromRow)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub price: i64,
    pub location: Option<String>,
    pub created_at: String,
    pub nickname: String,
    pub image_url: Option<String>,
}

/// Listings still for sale, newest first.
pub async fn load_feed(pool: &SqlitePool) -> AppResult<Vec<FeedItem>> {
    let items = sqlx::query_as::<_, FeedItem>(
        r#"
        SELECT p.id, p.title, p.price, p.location, p.created_at,
               pr.nickname,
               (SELECT i.image_url FROM product_images i
                 WHERE i.product_id = p.id
                 ORDER BY i.display_order, i.id LIMIT 1) AS image_url
        FROM products p
        JOIN profiles pr ON pr.id = p.user_id
        WHERE p.status = 'selling'
        ORDER BY p.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(FEED_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

#[debug_handler]
pub async fn feed_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let logged_in = session::current_user(&session).await?.is_some();
    let items = load_feed(&db_pool).await?;

    let mut cards = String::new();
    for item in items {
        let image = match &item.image_url {
            Some(url) => format!("<img src='{url}' alt=''>"),
            None => "<div class='placeholder'></div>".to_owned(),
        };
        cards += &include_res!(str, "/pages/product_item.html")
            .replace("{id}", &item.id)
            .replace("{image}", &image)
            .replace("{title}", &res::escape(&item.title))
            .replace("{price}", &res::format_price(item.price))
            .replace(
                "{location}",
                &res::escape(item.location.as_deref().unwrap_or("somewhere")),
            )
            .replace("{when}", &res::relative_age(&item.created_at))
            .replace("{nickname}", &res::escape(&item.nickname));
    }
    if cards.is_empty() {
        cards = "<p>nothing for sale yet — <a href='/products/new'>list the first item</a></p>"
            .to_owned();
    }

    let nav = if logged_in {
        "<a href='/products/new'>sell</a> <a href='/chat'>chats</a> <a href='/logout'>log out</a>"
    } else {
        "<a href='/login'>log in</a>"
    };

    Ok(Html(
        include_res!(str, "/pages/index.html")
            .replace("{nav}", nav)
            .replace("{product_items}", &cards),
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth, db, products};

    #[tokio::test]
    async fn feed_lists_only_items_still_for_sale() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();

        let seller = auth::create_profile(&pool, Some("seller")).await.unwrap();
        let kept = products::create_listing(&pool, Some(&seller.id), "lamp", "120", None, None)
            .await
            .unwrap();
        let gone = products::create_listing(&pool, Some(&seller.id), "sofa", "900", None, None)
            .await
            .unwrap();
        sqlx::query("UPDATE products SET status='sold' WHERE id=?")
            .bind(&gone.id)
            .execute(&pool)
            .await
            .unwrap();

        let items = load_feed(&pool).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, kept.id);
        assert_eq!(items[0].nickname, "seller");
    }
}
