use std::collections::HashSet;

use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::notifications::{self, NotificationKind, Outgoing};
use crate::{AppResult, Presence};

use super::{TODO_COLUMNS, Todo};

/// Remind about incomplete todos due inside the next hour. Deduplicated on
/// (recipient, kind, related id), so running the sweep again creates nothing
/// new — the one idempotence-bearing operation in the system.
pub(crate) async fn sweep(
    pool: &SqlitePool,
    presence: &Presence,
    user_id: Uuid,
) -> AppResult<usize> {
    let now = Utc::now();
    let until = now + Duration::hours(1);

    let due: Vec<Todo> = sqlx::query_as(&format!(
        "SELECT {TODO_COLUMNS} FROM todos \
         WHERE user_id = ? AND completed = 0 AND date >= ? AND date <= ?"
    ))
    .bind(user_id)
    .bind(now)
    .bind(until)
    .fetch_all(pool)
    .await?;

    if due.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT related_id FROM notifications WHERE kind = ");
    qb.push_bind(NotificationKind::TodoReminder);
    qb.push(" AND to_user = ");
    qb.push_bind(user_id);
    qb.push(" AND related_id IN (");
    let mut sep = qb.separated(", ");
    for todo in &due {
        sep.push_bind(todo.id);
    }
    qb.push(")");
    let reminded: HashSet<Uuid> = qb
        .build_query_scalar::<Uuid>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    let mut created = 0;
    for todo in due.iter().filter(|t| !reminded.contains(&t.id)) {
        match notifications::notify(
            pool,
            presence,
            Outgoing {
                to: user_id,
                from: user_id,
                kind: NotificationKind::TodoReminder,
                message: format!(
                    "Reminder: todo '{}' is due at {}",
                    todo.title,
                    todo.date.format("%Y-%m-%d %H:%M")
                ),
                related_id: todo.id,
            },
        )
        .await
        {
            Ok(_) => created += 1,
            Err(err) => tracing::warn!(todo = %todo.id, %err, "reminder skipped"),
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::todos::{self, CreateTodo, Priority};

    fn due_soon(title: &str, minutes: i64) -> CreateTodo {
        CreateTodo {
            title: title.into(),
            description: None,
            date: Utc::now() + Duration::minutes(minutes),
            start_time: None,
            end_time: None,
            completed: false,
            priority: Priority::Top,
        }
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let owner = testutil::student(&pool, "u4001", "Computer Science").await;

        todos::create(&pool, &presence, owner.id, due_soon("exam prep", 30))
            .await
            .unwrap();
        todos::create(&pool, &presence, owner.id, due_soon("hand in lab", 45))
            .await
            .unwrap();

        assert_eq!(sweep(&pool, &presence, owner.id).await.unwrap(), 2);
        let after_first: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE kind = 'todo_reminder'")
                .fetch_one(&pool)
                .await
                .unwrap();

        assert_eq!(sweep(&pool, &presence, owner.id).await.unwrap(), 0);
        let after_second: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE kind = 'todo_reminder'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn completed_and_far_off_todos_are_skipped() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let owner = testutil::student(&pool, "u4002", "Computer Science").await;

        let done = todos::create(&pool, &presence, owner.id, due_soon("already done", 30))
            .await
            .unwrap();
        todos::update(
            &pool,
            &presence,
            owner.id,
            done.id,
            todos::UpdateTodo {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        todos::create(
            &pool,
            &presence,
            owner.id,
            CreateTodo {
                date: Utc::now() + Duration::days(3),
                ..due_soon("next week", 0)
            },
        )
        .await
        .unwrap();

        assert_eq!(sweep(&pool, &presence, owner.id).await.unwrap(), 0);
    }
}
