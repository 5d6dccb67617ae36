use serde::Serialize;
use uuid::Uuid;

use crate::messaging::Message;
use crate::notifications::Notification;

/// Envelope pushed to connected clients over the socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(Message),
    NewNotification(Notification),
    GetOnlineUsers(Vec<Uuid>),
}
