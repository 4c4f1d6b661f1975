use axum::{
    debug_handler,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult, chat::repo, include_res, res,
    session::{self, RETURN_URL},
};

#[derive(Deserialize)]
pub(crate) struct StartChatQuery {
    product: Option<String>,
    seller: Option<String>,
}

/// The chat list page. With `?product=&seller=` it instead resolves (or
/// creates) the room for that listing and redirects into it — the entry point
/// used by the "chat with seller" button.
#[debug_handler]
pub(crate) async fn chat_list(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(StartChatQuery { product, seller }): Query<StartChatQuery>,
) -> AppResult<Response> {
    let Some(user_id) = session::current_user(&session).await? else {
        session.insert(RETURN_URL, "/chat").await?;
        return Ok(Redirect::to("/login").into_response());
    };

    if let (Some(product), Some(seller)) = (product, seller) {
        let chat = repo::find_or_create_room(&db_pool, &product, &seller, Some(&user_id)).await?;
        return Ok(Redirect::to(&format!("/chat/{}", chat.id)).into_response());
    }

    let rooms = repo::list_rooms_for_user(&db_pool, Some(&user_id)).await?;

    let mut items = String::new();
    for room in rooms {
        let unread_badge = if room.unread_count > 0 {
            format!("<span class='unread'>{}</span>", room.unread_count)
        } else {
            String::new()
        };
        items += &include_res!(str, "/pages/chat/chat_item.html")
            .replace("{chat_id}", &room.chat_id)
            .replace("{nickname}", &res::escape(&room.counterpart_nickname))
            .replace("{product_title}", &res::escape(&room.product_title))
            .replace(
                "{last_message}",
                &res::escape(room.last_message.as_deref().unwrap_or("say hello")),
            )
            .replace("{when}", &res::relative_age(&room.last_activity))
            .replace("{unread_badge}", &unread_badge);
    }
    if items.is_empty() {
        items = "<p>no chats yet</p>".to_owned();
    }

    Ok(Html(include_res!(str, "/pages/chat/list.html").replace("{chat_items}", &items))
        .into_response())
}
