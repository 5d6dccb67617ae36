use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::AppResult;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub created_at: DateTime<Utc>,
}

// Normalize so (a, b) and (b, a) land on the same row.
fn ordered(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

pub(crate) async fn find(pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
    let (lo, hi) = ordered(a, b);
    Ok(sqlx::query_as(
        "SELECT id, user_a, user_b, created_at FROM conversations WHERE user_a = ? AND user_b = ?",
    )
    .bind(lo)
    .bind(hi)
    .fetch_optional(pool)
    .await?)
}

/// At most one conversation per unordered pair, created lazily on first send.
/// The upsert keeps concurrent first-senders from racing past the UNIQUE
/// constraint.
pub(crate) async fn find_or_create(pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Conversation> {
    let (lo, hi) = ordered(a, b);
    sqlx::query(
        "INSERT INTO conversations (id, user_a, user_b, created_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT (user_a, user_b) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(lo)
    .bind(hi)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    find(pool, lo, hi)
        .await?
        .ok_or_else(|| anyhow::anyhow!("conversation missing after upsert").into())
}
