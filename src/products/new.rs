use std::{path::Path as FsPath, sync::Arc};

use axum::{
    body::Bytes,
    debug_handler,
    extract::{Multipart, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, config::Config, db,
    db::Product,
    include_res,
    session::{self, RETURN_URL},
};

#[debug_handler]
pub(crate) async fn new_listing_page(session: Session) -> AppResult<Response> {
    if session::current_user(&session).await?.is_none() {
        session.insert(RETURN_URL, "/products/new").await?;
        return Ok(Redirect::to("/login").into_response());
    }
    Ok(Html(include_res!(str, "/pages/products/new.html")).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_listing(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    session: Session,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let user_id = session::current_user(&session).await?;

    let mut title = String::new();
    let mut price = String::new();
    let mut description = String::new();
    let mut location = String::new();
    let mut images: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(anyhow::Error::from)? {
        match field.name() {
            Some("title") => title = field.text().await.map_err(anyhow::Error::from)?,
            Some("price") => price = field.text().await.map_err(anyhow::Error::from)?,
            Some("description") => {
                description = field.text().await.map_err(anyhow::Error::from)?;
            }
            Some("location") => location = field.text().await.map_err(anyhow::Error::from)?,
            Some("images") => {
                let ext = extension_of(field.file_name().unwrap_or(""));
                let data = field.bytes().await.map_err(anyhow::Error::from)?;
                if !data.is_empty() {
                    images.push((ext, data));
                }
            }
            _ => {}
        }
    }

    let product = create_listing(
        &db_pool,
        user_id.as_deref(),
        &title,
        &price,
        Some(&description),
        Some(&location),
    )
    .await?;

    store_images(&db_pool, &config.upload_dir, &product.id, images).await;

    Ok(Redirect::to(&format!("/products/{}", product.id)).into_response())
}

/// Validates and inserts a listing. Price must parse to a non-negative whole
/// number; title must trim non-empty.
pub async fn create_listing(
    pool: &SqlitePool,
    caller: Option<&str>,
    title: &str,
    price_raw: &str,
    description: Option<&str>,
    location: Option<&str>,
) -> AppResult<Product> {
    let caller = caller.ok_or(AppError::Unauthorized)?;

    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Invalid("title is required".to_owned()));
    }
    let price: i64 = price_raw
        .trim()
        .parse()
        .ok()
        .filter(|p| *p >= 0)
        .ok_or_else(|| AppError::Invalid("price must be a non-negative whole number".to_owned()))?;

    let product = Product {
        id: Uuid::now_v7().to_string(),
        user_id: caller.to_owned(),
        title: title.to_owned(),
        price,
        description: non_empty(description),
        location: non_empty(location),
        status: "selling".to_owned(),
        view_count: 0,
        created_at: db::now_timestamp(),
    };

    sqlx::query(
        "INSERT INTO products (id,user_id,title,price,description,location,status,view_count,created_at) VALUES (?,?,?,?,?,?,?,?,?)",
    )
    .bind(&product.id)
    .bind(&product.user_id)
    .bind(&product.title)
    .bind(product.price)
    .bind(&product.description)
    .bind(&product.location)
    .bind(&product.status)
    .bind(product.view_count)
    .bind(&product.created_at)
    .execute(pool)
    .await?;

    tracing::info!(product = %product.id, title = %product.title, "created listing");
    Ok(product)
}

/// Writes uploaded images under `{upload_dir}/{product_id}/` and records a
/// `product_images` row per stored file. A failed store skips that image
/// rather than failing the listing.
async fn store_images(
    pool: &SqlitePool,
    upload_dir: &FsPath,
    product_id: &str,
    images: Vec<(String, Bytes)>,
) {
    let dir = upload_dir.join(product_id);
    for (order, (ext, data)) in images.into_iter().enumerate() {
        let file_name = format!("{order}.{ext}");
        let stored = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join(&file_name), &data).await
        }
        .await;
        if let Err(err) = stored {
            tracing::warn!(product = %product_id, %file_name, error = %err, "skipping image");
            continue;
        }

        let url = format!("/uploads/{product_id}/{file_name}");
        let inserted = sqlx::query(
            "INSERT INTO product_images (id,product_id,image_url,display_order) VALUES (?,?,?,?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(product_id)
        .bind(&url)
        .bind(order as i64)
        .execute(pool)
        .await;
        if let Err(err) = inserted {
            tracing::warn!(product = %product_id, %file_name, error = %err, "skipping image row");
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn extension_of(file_name: &str) -> String {
    let ext: String = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase();
    if ext.is_empty() { "bin".to_owned() } else { ext }
}
