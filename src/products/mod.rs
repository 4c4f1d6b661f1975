mod detail;
mod feed;
mod new;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use detail::toggle_favorite;
pub use feed::{FeedItem, feed_page, load_feed};
pub use new::create_listing;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", get(new::new_listing_page).post(new::new_listing))
        .route("/{id}", get(detail::product_page))
        .route("/{id}/favorite", post(detail::favorite))
}
