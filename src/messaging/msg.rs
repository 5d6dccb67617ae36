use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::notifications::{self, NotificationKind, Outgoing};
use crate::realtime::{Presence, ServerEvent};
use crate::users::{self, User};
use crate::{AppResult, PortalError};

use super::conversation;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

const PREVIEW_CHARS: usize = 30;

pub(crate) async fn send_message(
    pool: &SqlitePool,
    presence: &Presence,
    sender: &User,
    receiver_id: Uuid,
    body: String,
) -> AppResult<Message> {
    if body.trim().is_empty() {
        return Err(PortalError::validation("message must not be empty"));
    }
    if users::fetch(pool, receiver_id).await?.is_none() {
        return Err(PortalError::NotFound("user"));
    }

    let conversation = conversation::find_or_create(pool, sender.id, receiver_id).await?;

    let message = Message {
        id: Uuid::now_v7(),
        conversation_id: conversation.id,
        sender_id: sender.id,
        receiver_id,
        message: body,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, message, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(message.id)
    .bind(message.conversation_id)
    .bind(message.sender_id)
    .bind(message.receiver_id)
    .bind(&message.message)
    .bind(message.created_at)
    .execute(pool)
    .await?;

    let preview: String = message.message.chars().take(PREVIEW_CHARS).collect();
    let ellipsis = if message.message.chars().count() > PREVIEW_CHARS {
        "..."
    } else {
        ""
    };
    notifications::notify(
        pool,
        presence,
        Outgoing {
            to: receiver_id,
            from: sender.id,
            kind: NotificationKind::NewMessage,
            message: format!("New message from {}: {preview}{ellipsis}", sender.full_name()),
            related_id: conversation.id,
        },
    )
    .await?;

    let presence = presence.clone();
    let pushed = message.clone();
    tokio::spawn(async move {
        let to = pushed.receiver_id;
        if !presence
            .push_to_user(to, &ServerEvent::NewMessage(pushed))
            .await
        {
            tracing::debug!(%to, "message push dropped, receiver offline");
        }
    });

    Ok(message)
}

pub(crate) async fn messages_with(
    pool: &SqlitePool,
    me: Uuid,
    peer: Uuid,
) -> AppResult<Vec<Message>> {
    let Some(conversation) = conversation::find(pool, me, peer).await? else {
        return Ok(Vec::new());
    };
    Ok(sqlx::query_as(
        "SELECT id, conversation_id, sender_id, receiver_id, message, created_at \
         FROM messages WHERE conversation_id = ? ORDER BY created_at, id",
    )
    .bind(conversation.id)
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn unordered_pair_shares_one_conversation_in_send_order() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let alice = testutil::student(&pool, "u2001", "Computer Science").await;
        let bob = testutil::student(&pool, "u2002", "Economics").await;

        let first = send_message(&pool, &presence, &alice, bob.id, "hello bob".into())
            .await
            .unwrap();
        let second = send_message(&pool, &presence, &bob, alice.id, "hello alice".into())
            .await
            .unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let thread = messages_with(&pool, alice.id, bob.id).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].message, "hello bob");
        assert_eq!(thread[1].message, "hello alice");
    }

    #[tokio::test]
    async fn sending_notifies_the_receiver() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let alice = testutil::student(&pool, "u2003", "Computer Science").await;
        let bob = testutil::student(&pool, "u2004", "Economics").await;

        let long_body = "x".repeat(60);
        let message = send_message(&pool, &presence, &alice, bob.id, long_body)
            .await
            .unwrap();

        let inbox = crate::notifications::for_user(&pool, bob.id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::NewMessage);
        assert_eq!(inbox[0].from, alice.id);
        assert_eq!(inbox[0].related_id, message.conversation_id);
        // 30-char preview plus ellipsis
        assert!(inbox[0].message.ends_with("..."));
    }

    #[tokio::test]
    async fn sending_to_an_unknown_user_is_not_found() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let alice = testutil::student(&pool, "u2005", "Computer Science").await;

        let err = send_message(&pool, &presence, &alice, Uuid::now_v7(), "anyone?".into())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
    }

    #[tokio::test]
    async fn no_conversation_means_an_empty_thread() {
        let pool = testutil::pool().await;
        let alice = testutil::student(&pool, "u2006", "Computer Science").await;
        let bob = testutil::student(&pool, "u2007", "Economics").await;

        let thread = messages_with(&pool, alice.id, bob.id).await.unwrap();
        assert!(thread.is_empty());
    }
}
