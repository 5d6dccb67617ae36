use axum::{Json, debug_handler, extract::State, http::StatusCode};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::users::{self, NewUser, RoleDetails, ScheduleEntry, User};
use crate::{AppResult, AppState, PortalError, session};

use super::password;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignupRequest {
    uni_id: String,
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    #[serde(flatten)]
    details: RoleDetails,
    #[serde(default)]
    schedule: Vec<ScheduleEntry>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(req): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    for (value, label) in [
        (&req.uni_id, "uniId"),
        (&req.first_name, "firstName"),
        (&req.last_name, "lastName"),
        (&req.email, "email"),
    ] {
        if value.trim().is_empty() {
            return Err(PortalError::validation(format!("{label} is required")));
        }
    }
    if req.password.len() < 8 {
        return Err(PortalError::validation(
            "password must be at least 8 characters",
        ));
    }

    let email_taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_one(&db_pool)
        .await?;
    if email_taken > 0 {
        return Err(PortalError::validation("email already exists"));
    }
    let uni_id_taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE uni_id = ?")
        .bind(&req.uni_id)
        .fetch_one(&db_pool)
        .await?;
    if uni_id_taken > 0 {
        return Err(PortalError::validation("university id already exists"));
    }

    let hash = password::hash_password(&req.password)?;
    let user = users::create(
        &db_pool,
        NewUser {
            uni_id: req.uni_id,
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            details: req.details,
            schedule: req.schedule,
        },
        &hash,
    )
    .await?;

    session.insert(session::USER_ID, user.id).await?;
    tracing::info!(user = %user.id, uni_id = %user.uni_id, "signup");
    Ok((StatusCode::CREATED, Json(user)))
}
