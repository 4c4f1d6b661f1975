use std::sync::Arc;

use axum::{Router, routing::get};
use fleamarket::{AppState, auth, chat, config::Config, db, products};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fleamarket=info,tower_http=warn")),
        )
        .init();

    let config = Config::from_env();

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;
    db::init_schema(&db_pool).await?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    let app_state = AppState {
        db_pool,
        chat_feed: chat::feed::ChatFeed::new(),
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .route("/", get(products::feed_page))
        .merge(auth::router())
        .nest("/products", products::router())
        .nest("/chat", chat::router())
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive());

    tracing::info!(addr = %config.bind_addr, "fleamarket listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
