use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, PortalError, session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

/// Role-specific attributes as a tagged variant. Every site that needs a
/// major or a title matches on this exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RoleDetails {
    Student { major: String },
    Teacher { title: String },
    Admin { title: String },
}

impl RoleDetails {
    pub fn role(&self) -> Role {
        match self {
            RoleDetails::Student { .. } => Role::Student,
            RoleDetails::Teacher { .. } => Role::Teacher,
            RoleDetails::Admin { .. } => Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeliveryMode {
    Campus,
    Online,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub day: Day,
    pub subject: String,
    pub start_time: String,
    pub end_time: String,
    pub mode: DeliveryMode,
    pub room: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub uni_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(flatten)]
    pub details: RoleDetails,
    pub schedule: Vec<ScheduleEntry>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        self.details.role()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

pub struct NewUser {
    pub uni_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub details: RoleDetails,
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    uni_id: String,
    first_name: String,
    last_name: String,
    email: String,
    role: Role,
    major: Option<String>,
    title: Option<String>,
    created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str =
    "id, uni_id, first_name, last_name, email, role, major, title, created_at";

impl UserRow {
    fn into_user(self, schedule: Vec<ScheduleEntry>) -> AppResult<User> {
        let details = match self.role {
            Role::Student => RoleDetails::Student {
                major: self
                    .major
                    .ok_or_else(|| anyhow!("student {} has no major", self.id))?,
            },
            Role::Teacher => RoleDetails::Teacher {
                title: self
                    .title
                    .ok_or_else(|| anyhow!("teacher {} has no title", self.id))?,
            },
            Role::Admin => RoleDetails::Admin {
                title: self
                    .title
                    .ok_or_else(|| anyhow!("admin {} has no title", self.id))?,
            },
        };
        Ok(User {
            id: self.id,
            uni_id: self.uni_id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            details,
            schedule,
            created_at: self.created_at,
        })
    }
}

pub async fn create(pool: &SqlitePool, new: NewUser, password_hash: &str) -> AppResult<User> {
    let id = Uuid::now_v7();
    let created_at = Utc::now();
    let (major, title) = match &new.details {
        RoleDetails::Student { major } => (Some(major.as_str()), None),
        RoleDetails::Teacher { title } | RoleDetails::Admin { title } => {
            (None, Some(title.as_str()))
        }
    };

    sqlx::query(
        "INSERT INTO users (id, uni_id, first_name, last_name, email, password_hash, role, major, title, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&new.uni_id)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.email)
    .bind(password_hash)
    .bind(new.details.role())
    .bind(major)
    .bind(title)
    .bind(created_at)
    .execute(pool)
    .await?;

    for (position, entry) in new.schedule.iter().enumerate() {
        sqlx::query(
            "INSERT INTO schedule_entries (user_id, position, day, subject, start_time, end_time, mode, room) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(position as i64)
        .bind(entry.day)
        .bind(&entry.subject)
        .bind(&entry.start_time)
        .bind(&entry.end_time)
        .bind(entry.mode)
        .bind(&entry.room)
        .execute(pool)
        .await?;
    }

    Ok(User {
        id,
        uni_id: new.uni_id,
        first_name: new.first_name,
        last_name: new.last_name,
        email: new.email,
        details: new.details,
        schedule: new.schedule,
        created_at,
    })
}

pub async fn fetch(pool: &SqlitePool, id: Uuid) -> AppResult<Option<User>> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    match row {
        Some(row) => {
            let schedule = schedule_of(pool, id).await?;
            Ok(Some(row.into_user(schedule)?))
        }
        None => Ok(None),
    }
}

pub async fn require(pool: &SqlitePool, id: Uuid) -> AppResult<User> {
    fetch(pool, id).await?.ok_or(PortalError::NotFound("user"))
}

/// The authenticated caller, loaded from the session cookie.
pub async fn current(pool: &SqlitePool, session: &Session) -> AppResult<User> {
    let id = session::require_user_id(session).await?;
    require(pool, id).await
}

pub async fn list(pool: &SqlitePool, role: Option<Role>) -> AppResult<Vec<User>> {
    let rows: Vec<UserRow> = match role {
        Some(role) => sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY last_name, first_name"
        ))
        .bind(role)
        .fetch_all(pool)
        .await?,
        None => {
            sqlx::query_as(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY last_name, first_name"
            ))
            .fetch_all(pool)
            .await?
        }
    };

    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        let schedule = schedule_of(pool, row.id).await?;
        users.push(row.into_user(schedule)?);
    }
    Ok(users)
}

async fn schedule_of(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<ScheduleEntry>> {
    Ok(sqlx::query_as(
        "SELECT day, subject, start_time, end_time, mode, room \
         FROM schedule_entries WHERE user_id = ? ORDER BY position",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}
