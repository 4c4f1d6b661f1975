use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, chat::repo, include_res, res,
    session::{self, RETURN_URL},
};

#[debug_handler]
pub(crate) async fn chat_room(
    Path(chat_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let chat_id = chat_id.to_string();
    let Some(user_id) = session::current_user(&session).await? else {
        session.insert(RETURN_URL, format!("/chat/{chat_id}")).await?;
        return Ok(Redirect::to("/login").into_response());
    };

    let detail = match repo::room_detail(&db_pool, &chat_id, Some(&user_id)).await {
        Ok(detail) => detail,
        Err(AppError::NotFound(_) | AppError::Forbidden(_)) => {
            return Ok(res::sorry("chat room"));
        }
        Err(err) => return Err(err),
    };

    let body = include_res!(str, "/pages/chat/room.html")
        .replace("{chat_id}", &detail.chat_id)
        .replace("{user_id}", &user_id)
        .replace("{nickname}", &res::escape(&detail.counterpart_nickname))
        .replace("{product_id}", &detail.product_id)
        .replace("{product_title}", &res::escape(&detail.product_title))
        .replace("{product_price}", &res::format_price(detail.product_price))
        .replace("{product_status}", status_label(&detail.product_status))
        .replace(
            "{product_image}",
            detail.product_image.as_deref().unwrap_or(""),
        );

    Ok(Html(body).into_response())
}

fn status_label(status: &str) -> &'static str {
    match status {
        "reserved" => "reserved",
        "sold" => "sold",
        _ => "for sale",
    }
}
