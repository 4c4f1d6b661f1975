use axum::{
    debug_handler,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, session,
    chat::{
        feed::ChatFeed,
        repo,
        room::{DayGroup, RoomSession},
    },
    db::Message,
};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Snapshot { groups: Vec<DayGroup> },
    Message { message: Message },
    Error { error: String, content: String },
}

#[derive(Deserialize)]
struct ClientFrame {
    content: String,
}

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    Path(chat_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(feed): State<ChatFeed>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(user_id) = session::current_user(&session).await? else {
        return Err(AppError::Unauthorized);
    };
    let chat_id = chat_id.to_string();

    // membership is checked before the upgrade; the socket task can assume it
    repo::room_detail(&db_pool, &chat_id, Some(&user_id)).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(err) = run_session(socket, &db_pool, &feed, &chat_id, &user_id).await {
            tracing::debug!(chat = %chat_id, error = %err, "chat session ended");
        }
        // the feed receiver is dropped with the task, so teardown happens
        // whether the session ended cleanly or not
    }))
}

/// Drives one open room session. This task is the only mutator of its
/// `RoomSession`; the feed and the client stream are routed through it.
async fn run_session(
    socket: WebSocket,
    db_pool: &SqlitePool,
    feed: &ChatFeed,
    chat_id: &str,
    user_id: &str,
) -> AppResult<()> {
    // subscribe before taking the snapshot so nothing can fall between the
    // two; the session dedups whatever arrives through both paths
    let mut events = feed.subscribe(chat_id);

    let snapshot = repo::list_messages(db_pool, chat_id, Some(user_id)).await?;
    repo::mark_read(db_pool, chat_id, Some(user_id)).await?;

    let mut room = RoomSession::new(user_id, snapshot);
    let (mut sink, mut stream) = socket.split();

    send_frame(
        &mut sink,
        &ServerFrame::Snapshot {
            groups: room.day_groups(),
        },
    )
    .await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(message) => {
                    if room.apply(message.clone()) {
                        if room.from_counterpart(&message) {
                            repo::mark_read(db_pool, chat_id, Some(user_id)).await?;
                        }
                        send_frame(&mut sink, &ServerFrame::Message { message }).await?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(chat = %chat_id, skipped, "live feed lagged, resyncing from store");
                    let snapshot = repo::list_messages(db_pool, chat_id, Some(user_id)).await?;
                    repo::mark_read(db_pool, chat_id, Some(user_id)).await?;
                    for message in snapshot {
                        if room.apply(message.clone()) {
                            send_frame(&mut sink, &ServerFrame::Message { message }).await?;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let Ok(ClientFrame { content }) = serde_json::from_str::<ClientFrame>(&text) else {
                        continue;
                    };
                    match repo::send_message(db_pool, chat_id, Some(user_id), &content).await {
                        // no optimistic append: the sent message shows up via
                        // the feed echo, same as for the counterpart
                        Ok(message) => feed.publish(&message),
                        Err(err @ (AppError::Invalid(_) | AppError::Forbidden(_) | AppError::NotFound(_))) => {
                            // hand the content back so the client can restore
                            // the input for a retry
                            send_frame(
                                &mut sink,
                                &ServerFrame::Error { error: err.to_string(), content },
                            )
                            .await?;
                        }
                        Err(err) => return Err(err),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    Ok(())
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrame,
) -> AppResult<()> {
    let text = serde_json::to_string(frame)?;
    sink.send(WsMessage::Text(text.into()))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(())
}
