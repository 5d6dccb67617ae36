mod reminders;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::notifications::{self, NotificationKind, Outgoing};
use crate::{AppResult, AppState, PortalError, Presence, session};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_todos).post(post_todo))
        .route("/{id}", put(put_todo).delete(delete_todo))
        .route("/check-reminders", post(check_reminders))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Priority {
    Top,
    Moderate,
    Low,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

const TODO_COLUMNS: &str =
    "id, user_id, title, description, date, start_time, end_time, completed, priority, created_at";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateTodo {
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    pub(crate) date: DateTime<Utc>,
    #[serde(default)]
    pub(crate) start_time: Option<String>,
    #[serde(default)]
    pub(crate) end_time: Option<String>,
    #[serde(default)]
    pub(crate) completed: bool,
    pub(crate) priority: Priority,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateTodo {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) date: Option<DateTime<Utc>>,
    pub(crate) start_time: Option<String>,
    pub(crate) end_time: Option<String>,
    pub(crate) completed: Option<bool>,
    pub(crate) priority: Option<Priority>,
}

pub(crate) async fn list(pool: &SqlitePool, owner_id: Uuid) -> AppResult<Vec<Todo>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ? ORDER BY date, start_time"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?)
}

pub(crate) async fn create(
    pool: &SqlitePool,
    presence: &Presence,
    owner_id: Uuid,
    req: CreateTodo,
) -> AppResult<Todo> {
    if req.title.trim().is_empty() {
        return Err(PortalError::validation("title is required"));
    }

    let todo = Todo {
        id: Uuid::now_v7(),
        user_id: owner_id,
        title: req.title,
        description: req.description,
        date: req.date,
        start_time: req.start_time,
        end_time: req.end_time,
        completed: req.completed,
        priority: req.priority,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO todos (id, user_id, title, description, date, start_time, end_time, completed, priority, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(todo.id)
    .bind(todo.user_id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.date)
    .bind(&todo.start_time)
    .bind(&todo.end_time)
    .bind(todo.completed)
    .bind(todo.priority)
    .bind(todo.created_at)
    .execute(pool)
    .await?;

    notifications::notify(
        pool,
        presence,
        Outgoing {
            to: owner_id,
            from: owner_id,
            kind: NotificationKind::TodoCreated,
            message: format!("New todo added: {}", todo.title),
            related_id: todo.id,
        },
    )
    .await?;

    Ok(todo)
}

// Scoped to the owner so foreign ids read as absent, not forbidden.
async fn fetch_owned(pool: &SqlitePool, id: Uuid, owner_id: Uuid) -> AppResult<Option<Todo>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {TODO_COLUMNS} FROM todos WHERE id = ? AND user_id = ?"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?)
}

pub(crate) async fn update(
    pool: &SqlitePool,
    presence: &Presence,
    owner_id: Uuid,
    id: Uuid,
    changes: UpdateTodo,
) -> AppResult<Todo> {
    let Some(mut todo) = fetch_owned(pool, id, owner_id).await? else {
        return Err(PortalError::NotFound("todo"));
    };

    let was_completed = todo.completed;
    if let Some(title) = changes.title {
        if title.trim().is_empty() {
            return Err(PortalError::validation("title is required"));
        }
        todo.title = title;
    }
    if let Some(description) = changes.description {
        todo.description = Some(description);
    }
    if let Some(date) = changes.date {
        todo.date = date;
    }
    if let Some(start_time) = changes.start_time {
        todo.start_time = Some(start_time);
    }
    if let Some(end_time) = changes.end_time {
        todo.end_time = Some(end_time);
    }
    if let Some(completed) = changes.completed {
        todo.completed = completed;
    }
    if let Some(priority) = changes.priority {
        todo.priority = priority;
    }

    sqlx::query(
        "UPDATE todos SET title = ?, description = ?, date = ?, start_time = ?, end_time = ?, completed = ?, priority = ? \
         WHERE id = ? AND user_id = ?",
    )
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.date)
    .bind(&todo.start_time)
    .bind(&todo.end_time)
    .bind(todo.completed)
    .bind(todo.priority)
    .bind(todo.id)
    .bind(owner_id)
    .execute(pool)
    .await?;

    let text = if was_completed != todo.completed {
        let state = if todo.completed {
            "complete"
        } else {
            "incomplete"
        };
        format!("Todo '{}' marked as {state}", todo.title)
    } else {
        format!("Todo updated: {}", todo.title)
    };
    notifications::notify(
        pool,
        presence,
        Outgoing {
            to: owner_id,
            from: owner_id,
            kind: NotificationKind::TodoUpdated,
            message: text,
            related_id: todo.id,
        },
    )
    .await?;

    Ok(todo)
}

pub(crate) async fn delete(pool: &SqlitePool, owner_id: Uuid, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM todos WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(PortalError::NotFound("todo"));
    }
    // the todo's notification trail goes with it
    sqlx::query("DELETE FROM notifications WHERE related_id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[debug_handler(state = AppState)]
async fn list_todos(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Todo>>> {
    let user_id = session::require_user_id(&session).await?;
    Ok(Json(list(&db_pool, user_id).await?))
}

#[debug_handler(state = AppState)]
async fn post_todo(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    session: Session,
    Json(req): Json<CreateTodo>,
) -> AppResult<(StatusCode, Json<Todo>)> {
    let user_id = session::require_user_id(&session).await?;
    let todo = create(&db_pool, &presence, user_id, req).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

#[debug_handler(state = AppState)]
async fn put_todo(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(changes): Json<UpdateTodo>,
) -> AppResult<Json<Todo>> {
    let user_id = session::require_user_id(&session).await?;
    Ok(Json(update(&db_pool, &presence, user_id, id, changes).await?))
}

#[debug_handler(state = AppState)]
async fn delete_todo(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let user_id = session::require_user_id(&session).await?;
    delete(&db_pool, user_id, id).await?;
    Ok(Json(json!({ "message": "deleted" })))
}

#[debug_handler(state = AppState)]
async fn check_reminders(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user_id = session::require_user_id(&session).await?;
    let created = reminders::sweep(&db_pool, &presence, user_id).await?;
    Ok(Json(json!({ "created": created })))
}
