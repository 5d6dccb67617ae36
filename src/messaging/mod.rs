mod conversation;
mod msg;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, AppState, Presence, session, users};

pub use conversation::Conversation;
pub use msg::Message;

pub(crate) use msg::{messages_with, send_message};

pub fn router() -> Router<AppState> {
    Router::new().route("/{peer_id}", get(get_messages).post(post_message))
}

#[derive(Deserialize)]
pub(crate) struct SendMessageBody {
    message: String,
}

#[debug_handler(state = AppState)]
async fn post_message(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    session: Session,
    Path(peer_id): Path<Uuid>,
    Json(SendMessageBody { message }): Json<SendMessageBody>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let sender = users::current(&db_pool, &session).await?;
    let message = send_message(&db_pool, &presence, &sender, peer_id, message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[debug_handler(state = AppState)]
async fn get_messages(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(peer_id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    let user_id = session::require_user_id(&session).await?;
    Ok(Json(messages_with(&db_pool, user_id, peer_id).await?))
}
