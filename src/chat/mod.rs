pub mod feed;
mod list;
mod page;
pub mod repo;
pub mod room;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::chat_list))
        .route("/{id}", get(page::chat_room))
        .route("/{id}/ws", get(ws::chat_ws))
}
