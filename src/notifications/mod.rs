mod fanout;

use axum::{
    Json, Router, debug_handler,
    extract::State,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, AppState, PortalError, session};

pub use fanout::{Outgoing, notify, notify_each};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/my", get(my_notifications))
        .route("/mark-read", post(mark_read))
}

/// The closed set of notification tags this system actually emits; the wire
/// strings match the snake_case variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
    Announcement,
    TodoCreated,
    TodoUpdated,
    TodoReminder,
    AppointmentRequest,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[sqlx(rename = "to_user")]
    pub to: Uuid,
    #[sqlx(rename = "from_user")]
    pub from: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub related_id: Uuid,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[debug_handler(state = AppState)]
async fn my_notifications(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Notification>>> {
    let user_id = session::require_user_id(&session).await?;
    Ok(Json(for_user(&db_pool, user_id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkReadRequest {
    notification_ids: Vec<Uuid>,
}

#[debug_handler(state = AppState)]
async fn mark_read(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(MarkReadRequest { notification_ids }): Json<MarkReadRequest>,
) -> AppResult<Json<Value>> {
    let user_id = session::require_user_id(&session).await?;
    if notification_ids.is_empty() {
        return Err(PortalError::validation("notificationIds must not be empty"));
    }

    let updated = mark_read_for(&db_pool, user_id, &notification_ids).await?;
    if updated == 0 {
        return Err(PortalError::NotFound("notification"));
    }
    Ok(Json(json!({ "updated": updated })))
}

// Only rows owned by the caller are touched, whatever ids were sent.
pub(crate) async fn mark_read_for(
    pool: &SqlitePool,
    user_id: Uuid,
    ids: &[Uuid],
) -> AppResult<u64> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE notifications SET read = 1 WHERE to_user = ");
    qb.push_bind(user_id);
    qb.push(" AND id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    qb.push(")");
    Ok(qb.build().execute(pool).await?.rows_affected())
}

pub(crate) async fn for_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Notification>> {
    Ok(sqlx::query_as(
        "SELECT id, to_user, from_user, kind, message, related_id, read, created_at \
         FROM notifications WHERE to_user = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}
