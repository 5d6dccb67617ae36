use axum::{Json, debug_handler};
use serde_json::{Value, json};
use tower_sessions::Session;

use crate::AppResult;

#[debug_handler]
pub(crate) async fn logout(session: Session) -> AppResult<Json<Value>> {
    session.clear().await;
    Ok(Json(json!({ "message": "logged out" })))
}
