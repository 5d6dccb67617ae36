mod events;
mod ws;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::sync::{RwLock, mpsc::UnboundedSender};
use uuid::Uuid;

use crate::AppState;

pub use events::ServerEvent;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::portal_ws))
}

#[derive(Default)]
struct Registry {
    by_user: HashMap<Uuid, Uuid>,
    connections: HashMap<Uuid, UnboundedSender<String>>,
}

/// Process-local map from user id to their live socket connection. Created
/// once at startup and dies with the process; clients re-register on
/// reconnect, so nothing here is ever persisted.
#[derive(Clone, Default)]
pub struct Presence {
    inner: Arc<RwLock<Registry>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last connection wins: a reconnecting user displaces their previous
    /// socket, whose sender is dropped so its forward task winds down.
    pub async fn register(&self, user_id: Uuid, conn_id: Uuid, tx: UnboundedSender<String>) {
        {
            let mut reg = self.inner.write().await;
            if let Some(old) = reg.by_user.insert(user_id, conn_id) {
                reg.connections.remove(&old);
            }
            reg.connections.insert(conn_id, tx);
        }
        self.broadcast_online().await;
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        let removed = {
            let mut reg = self.inner.write().await;
            let removed = reg.connections.remove(&conn_id).is_some();
            reg.by_user.retain(|_, c| *c != conn_id);
            removed
        };
        if removed {
            self.broadcast_online().await;
        }
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<Uuid> {
        self.inner.read().await.by_user.get(&user_id).copied()
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.read().await.by_user.keys().copied().collect()
    }

    /// Best-effort, at-most-once delivery. Returns whether a live connection
    /// accepted the event; offline recipients are skipped silently and the
    /// persisted row remains the durable record.
    pub async fn push_to_user(&self, user_id: Uuid, event: &ServerEvent) -> bool {
        let Ok(payload) = serde_json::to_string(event) else {
            return false;
        };
        let reg = self.inner.read().await;
        let Some(conn_id) = reg.by_user.get(&user_id) else {
            return false;
        };
        match reg.connections.get(conn_id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Every presence change pushes the full online list to every client.
    async fn broadcast_online(&self) {
        let reg = self.inner.read().await;
        let online: Vec<Uuid> = reg.by_user.keys().copied().collect();
        let Ok(payload) = serde_json::to_string(&ServerEvent::GetOnlineUsers(online)) else {
            return;
        };
        for tx in reg.connections.values() {
            let _ = tx.send(payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn register_lookup_unregister_round_trip() {
        let presence = Presence::new();
        let user = Uuid::now_v7();
        let conn = Uuid::now_v7();
        let (tx, mut rx) = mpsc::unbounded_channel();

        presence.register(user, conn, tx).await;
        assert_eq!(presence.lookup(user).await, Some(conn));

        // registering broadcasts the online list to the new connection
        let payload = rx.recv().await.unwrap();
        let event: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(event["event"], "getOnlineUsers");
        assert_eq!(event["data"][0], user.to_string());

        presence.unregister(conn).await;
        assert_eq!(presence.lookup(user).await, None);
        assert!(presence.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn unregister_of_unknown_connection_is_a_noop() {
        let presence = Presence::new();
        presence.unregister(Uuid::now_v7()).await;
        assert!(presence.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn reconnect_replaces_previous_connection() {
        let presence = Presence::new();
        let user = Uuid::now_v7();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old_conn = Uuid::now_v7();
        let new_conn = Uuid::now_v7();

        presence.register(user, old_conn, old_tx).await;
        presence.register(user, new_conn, new_tx).await;

        assert_eq!(presence.lookup(user).await, Some(new_conn));

        // drain the registration broadcasts before pushing
        while old_rx.try_recv().is_ok() {}
        while new_rx.try_recv().is_ok() {}

        let event = ServerEvent::GetOnlineUsers(vec![user]);
        assert!(presence.push_to_user(user, &event).await);
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn push_to_offline_user_is_dropped() {
        let presence = Presence::new();
        let event = ServerEvent::GetOnlineUsers(vec![]);
        assert!(!presence.push_to_user(Uuid::now_v7(), &event).await);
    }
}
