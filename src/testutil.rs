use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

use crate::db;
use crate::users::{self, Day, DeliveryMode, NewUser, RoleDetails, ScheduleEntry, User};

// One connection so every query in a test sees the same in-memory database.
pub(crate) async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    db::init_schema(&pool).await.expect("schema");
    pool
}

pub(crate) async fn student(pool: &SqlitePool, uni_id: &str, major: &str) -> User {
    create_user(
        pool,
        uni_id,
        RoleDetails::Student {
            major: major.into(),
        },
        Vec::new(),
    )
    .await
}

pub(crate) async fn student_with_subject(
    pool: &SqlitePool,
    uni_id: &str,
    major: &str,
    subject: &str,
) -> User {
    create_user(
        pool,
        uni_id,
        RoleDetails::Student {
            major: major.into(),
        },
        vec![ScheduleEntry {
            day: Day::Monday,
            subject: subject.into(),
            start_time: "09:00 AM".into(),
            end_time: "10:30 AM".into(),
            mode: DeliveryMode::Campus,
            room: "B204".into(),
        }],
    )
    .await
}

pub(crate) async fn teacher(pool: &SqlitePool, uni_id: &str) -> User {
    create_user(
        pool,
        uni_id,
        RoleDetails::Teacher {
            title: "Professor".into(),
        },
        Vec::new(),
    )
    .await
}

async fn create_user(
    pool: &SqlitePool,
    uni_id: &str,
    details: RoleDetails,
    schedule: Vec<ScheduleEntry>,
) -> User {
    users::create(
        pool,
        NewUser {
            uni_id: uni_id.into(),
            first_name: "Test".into(),
            last_name: uni_id.to_uppercase(),
            email: format!("{uni_id}@uni.test"),
            details,
            schedule,
        },
        "$argon2id$not-a-real-hash",
    )
    .await
    .expect("test user")
}
