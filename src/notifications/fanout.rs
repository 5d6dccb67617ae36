use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{Notification, NotificationKind};
use crate::AppResult;
use crate::realtime::{Presence, ServerEvent};

/// A notification about to be fanned out.
pub struct Outgoing {
    pub to: Uuid,
    pub from: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub related_id: Uuid,
}

/// Persist one notification, then push it to the recipient from a spawned
/// task. Delivery failure is swallowed and logged, never surfaced to the
/// caller; the row is the durable record.
pub async fn notify(
    pool: &SqlitePool,
    presence: &Presence,
    outgoing: Outgoing,
) -> AppResult<Notification> {
    let notification = Notification {
        id: Uuid::now_v7(),
        to: outgoing.to,
        from: outgoing.from,
        kind: outgoing.kind,
        message: outgoing.message,
        related_id: outgoing.related_id,
        read: false,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO notifications (id, to_user, from_user, kind, message, related_id, read, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(notification.id)
    .bind(notification.to)
    .bind(notification.from)
    .bind(notification.kind)
    .bind(&notification.message)
    .bind(notification.related_id)
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(pool)
    .await?;

    let presence = presence.clone();
    let pushed = notification.clone();
    tokio::spawn(async move {
        let to = pushed.to;
        let kind = pushed.kind;
        if !presence
            .push_to_user(to, &ServerEvent::NewNotification(pushed))
            .await
        {
            tracing::debug!(%to, ?kind, "notification push dropped, recipient offline");
        }
    });

    Ok(notification)
}

/// Fan out to a whole recipient set. A persistence failure for one recipient
/// skips that recipient only; earlier rows stand. Returns how many rows were
/// created.
pub async fn notify_each(
    pool: &SqlitePool,
    presence: &Presence,
    recipients: &[Uuid],
    mut outgoing: impl FnMut(Uuid) -> Outgoing,
) -> usize {
    let mut created = 0;
    for &to in recipients {
        match notify(pool, presence, outgoing(to)).await {
            Ok(_) => created += 1,
            Err(err) => tracing::warn!(%to, %err, "notification skipped"),
        }
    }
    created
}
