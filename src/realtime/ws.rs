use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, Presence, session};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn portal_ws(
    State(presence): State<Presence>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user_id = session::require_user_id(&session).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, presence, user_id)))
}

async fn handle_socket(socket: WebSocket, presence: Presence, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = Uuid::now_v7();

    presence.register(user_id, conn_id, tx).await;
    tracing::debug!(%user_id, %conn_id, "socket connected");

    let mut forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(WsMessage::from(payload)).await.is_err() {
                break;
            }
        }
    });

    // Clients only listen on this socket; drain frames until the peer goes
    // away or the forward task dies (e.g. displaced by a reconnect).
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut forward => break,
        }
    }

    forward.abort();
    presence.unregister(conn_id).await;
    tracing::debug!(%user_id, %conn_id, "socket disconnected");
}
