pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod products;
pub mod res;
pub mod session;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use error::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub chat_feed: chat::feed::ChatFeed,
    pub config: Arc<config::Config>,
}
