use axum::{Json, debug_handler, extract::State};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::users::{self, User};
use crate::{AppResult, AppState, PortalError, session};

use super::password;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest {
    uni_id: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(LoginRequest { uni_id, password }): Json<LoginRequest>,
) -> AppResult<Json<User>> {
    let row: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE uni_id = ?")
            .bind(&uni_id)
            .fetch_optional(&db_pool)
            .await?;
    // one error for both unknown id and bad password
    let Some((user_id, hash)) = row else {
        return Err(PortalError::InvalidCredentials);
    };
    password::verify_password(&password, &hash)?;

    session.insert(session::USER_ID, user_id).await?;
    tracing::info!(user = %user_id, "login");
    Ok(Json(users::require(&db_pool, user_id).await?))
}
