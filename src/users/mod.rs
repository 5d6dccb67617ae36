mod model;

use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, AppState};

pub use model::{
    Day, DeliveryMode, NewUser, Role, RoleDetails, ScheduleEntry, User, create, current, fetch,
    list, require,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_users))
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    role: Option<Role>,
}

#[debug_handler(state = AppState)]
async fn list_users(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(ListQuery { role }): Query<ListQuery>,
) -> AppResult<Json<Vec<User>>> {
    crate::session::require_user_id(&session).await?;
    Ok(Json(list(&db_pool, role).await?))
}
