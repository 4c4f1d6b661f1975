use tower_sessions::Session;

use crate::AppResult;

pub const USER_ID: &str = "user_id";
pub const RETURN_URL: &str = "return_url";

pub async fn current_user(session: &Session) -> AppResult<Option<String>> {
    Ok(session.get::<String>(USER_ID).await?)
}
