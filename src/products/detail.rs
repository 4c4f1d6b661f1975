use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, db,
    db::{Product, ProductImage},
    include_res, res,
    session::{self, RETURN_URL},
};

#[debug_handler]
pub(crate) async fn product_page(
    Path(product_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let product_id = product_id.to_string();
    let viewer = session::current_user(&session).await?;

    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id=?")
        .bind(&product_id)
        .fetch_optional(&db_pool)
        .await?;
    let Some(product) = product else {
        return Ok(res::sorry("listing"));
    };

    let is_owner = viewer.as_deref() == Some(product.user_id.as_str());
    if !is_owner {
        sqlx::query("UPDATE products SET view_count = view_count + 1 WHERE id=?")
            .bind(&product_id)
            .execute(&db_pool)
            .await?;
    }

    let (nickname,): (String,) = sqlx::query_as("SELECT nickname FROM profiles WHERE id=?")
        .bind(&product.user_id)
        .fetch_one(&db_pool)
        .await?;

    let images: Vec<ProductImage> = sqlx::query_as(
        "SELECT * FROM product_images WHERE product_id=? ORDER BY display_order, id",
    )
    .bind(&product_id)
    .fetch_all(&db_pool)
    .await?;

    let (favorite_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE product_id=?")
            .bind(&product_id)
            .fetch_one(&db_pool)
            .await?;

    let mut gallery = String::new();
    for image in &images {
        gallery += &format!("<img src='{}' alt=''>", image.image_url);
    }
    if gallery.is_empty() {
        gallery = "<div class='placeholder'></div>".to_owned();
    }

    let actions = if is_owner {
        String::new()
    } else if viewer.is_some() {
        format!(
            "<a class='button' href='/chat?product={}&seller={}'>chat with seller</a> \
             <form method='post' action='/products/{}/favorite'><button>♥ {}</button></form>",
            product.id, product.user_id, product.id, favorite_count,
        )
    } else {
        "<a href='/login'>log in to chat or favorite</a>".to_owned()
    };

    let body = include_res!(str, "/pages/products/detail.html")
        .replace("{title}", &res::escape(&product.title))
        .replace("{price}", &res::format_price(product.price))
        .replace("{status}", status_label(&product.status))
        .replace("{nickname}", &res::escape(&nickname))
        .replace(
            "{location}",
            &res::escape(product.location.as_deref().unwrap_or("somewhere")),
        )
        .replace("{when}", &res::relative_age(&product.created_at))
        .replace("{view_count}", &product.view_count.to_string())
        .replace("{gallery}", &gallery)
        .replace(
            "{description}",
            &res::markdown(product.description.as_deref().unwrap_or("")),
        )
        .replace("{actions}", &actions);

    Ok(Html(body).into_response())
}

#[debug_handler]
pub(crate) async fn favorite(
    Path(product_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let product_id = product_id.to_string();
    let Some(user_id) = session::current_user(&session).await? else {
        session
            .insert(RETURN_URL, format!("/products/{product_id}"))
            .await?;
        return Ok(Redirect::to("/login").into_response());
    };

    toggle_favorite(&db_pool, Some(&user_id), &product_id).await?;
    Ok(Redirect::to(&format!("/products/{product_id}")).into_response())
}

/// Adds or removes the caller's favorite on a listing. Returns true when the
/// listing is favorited after the call.
pub async fn toggle_favorite(
    pool: &SqlitePool,
    caller: Option<&str>,
    product_id: &str,
) -> AppResult<bool> {
    let caller = caller.ok_or(AppError::Unauthorized)?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT user_id FROM products WHERE id=?")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("product"));
    }

    let removed = sqlx::query("DELETE FROM favorites WHERE user_id=? AND product_id=?")
        .bind(caller)
        .bind(product_id)
        .execute(pool)
        .await?;
    if removed.rows_affected() > 0 {
        return Ok(false);
    }

    sqlx::query("INSERT INTO favorites (id,user_id,product_id,created_at) VALUES (?,?,?,?)")
        .bind(Uuid::now_v7().to_string())
        .bind(caller)
        .bind(product_id)
        .bind(db::now_timestamp())
        .execute(pool)
        .await?;
    Ok(true)
}

fn status_label(status: &str) -> &'static str {
    match status {
        "reserved" => "reserved",
        "sold" => "sold",
        _ => "for sale",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth, products};

    #[tokio::test]
    async fn favorites_toggle_on_and_off() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();

        let seller = auth::create_profile(&pool, Some("seller")).await.unwrap();
        let fan = auth::create_profile(&pool, Some("fan")).await.unwrap();
        let product = products::create_listing(&pool, Some(&seller.id), "lamp", "120", None, None)
            .await
            .unwrap();

        assert!(toggle_favorite(&pool, Some(&fan.id), &product.id).await.unwrap());
        assert!(!toggle_favorite(&pool, Some(&fan.id), &product.id).await.unwrap());
        assert!(matches!(
            toggle_favorite(&pool, None, &product.id).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            toggle_favorite(&pool, Some(&fan.id), "missing").await,
            Err(AppError::NotFound(_))
        ));
    }
}
