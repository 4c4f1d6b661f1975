use axum::{
    Form, Router, debug_handler,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult, AppState, db,
    db::Profile,
    include_res,
    session::{RETURN_URL, USER_ID},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
}

#[derive(Deserialize)]
struct LoginForm {
    nickname: String,
}

#[debug_handler]
async fn login_page() -> impl IntoResponse {
    Html(include_res!(str, "/pages/login.html"))
}

#[debug_handler]
async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(LoginForm { nickname }): Form<LoginForm>,
) -> AppResult<Response> {
    let nickname = nickname.trim();

    let profile = if nickname.is_empty() {
        create_profile(&db_pool, None).await?
    } else {
        let existing: Option<Profile> =
            sqlx::query_as("SELECT * FROM profiles WHERE nickname=?")
                .bind(nickname)
                .fetch_optional(&db_pool)
                .await?;
        match existing {
            Some(profile) => profile,
            None => create_profile(&db_pool, Some(nickname)).await?,
        }
    };

    session.insert(USER_ID, &profile.id).await?;
    tracing::info!(user = %profile.nickname, "logged in");

    let return_url: Option<String> = session.remove(RETURN_URL).await?;
    Ok(Redirect::to(return_url.as_deref().unwrap_or("/")).into_response())
}

#[derive(Deserialize)]
struct LogoutQuery {
    return_url: Option<String>,
}

#[debug_handler]
async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    session: Session,
) -> AppResult<Redirect> {
    session.clear().await;
    Ok(Redirect::to(return_url.as_deref().unwrap_or("/")))
}

pub async fn create_profile(db_pool: &SqlitePool, nickname: Option<&str>) -> AppResult<Profile> {
    let profile = Profile {
        id: Uuid::now_v7().to_string(),
        nickname: match nickname {
            Some(nickname) => nickname.to_owned(),
            None => random_nickname(),
        },
        avatar_url: None,
        created_at: db::now_timestamp(),
    };

    sqlx::query("INSERT INTO profiles (id,nickname,avatar_url,created_at) VALUES (?,?,?,?)")
        .bind(&profile.id)
        .bind(&profile.nickname)
        .bind(&profile.avatar_url)
        .bind(&profile.created_at)
        .execute(db_pool)
        .await?;

    tracing::info!(user = %profile.nickname, "created profile");
    Ok(profile)
}

fn random_nickname() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{}{}{}",
        adjectives.choose(&mut rng).copied().unwrap_or("Rusty"),
        nouns.choose(&mut rng).copied().unwrap_or("Fox"),
        rand::random_range(10..100),
    )
}
