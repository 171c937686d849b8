//! WebSocket Connection Handler
//!
//! Drives one connection through its lifecycle: handshake validation,
//! registration, the read loop, and cleanup on disconnect.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::{Ack, InboundMessage, OutboundFrame};
use super::registry::ConnectionRegistry;
use crate::startup::AppState;

/// Handshake parameters supplied as query parameters on the upgrade
/// request. Each endpoint requires its own field.
#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "deviceKey")]
    pub device_key: Option<String>,
}

/// WebSocket upgrade handler for the user namespace.
pub async fn users_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state.users.clone(), params.user_id))
}

/// WebSocket upgrade handler for the device namespace.
pub async fn devices_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state.devices.clone(), params.device_key))
}

/// Handles one accepted connection for a namespace registry.
async fn serve_connection(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    identity: Option<String>,
) {
    let (sender, receiver) = socket.split();
    drive_connection(sender, receiver, registry, identity).await;
}

/// Drives one accepted connection through its lifecycle: handshake
/// validation, registration, the read loop, and cleanup on disconnect.
///
/// Generic over the transport halves so the lifecycle can run against any
/// message sink/stream, not just an upgraded socket.
pub async fn drive_connection<S, R>(
    mut sender: S,
    mut receiver: R,
    registry: Arc<ConnectionRegistry>,
    identity: Option<String>,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let namespace = registry.namespace();

    // Hard precondition: no identity, no registration. Close immediately.
    let Some(identity) = identity else {
        tracing::warn!(
            namespace = namespace.label(),
            field = namespace.handshake_field(),
            "Client attempted to connect without identity"
        );
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    let connection_id = Uuid::new_v4().to_string();

    // Channel feeding the writer task
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Pending -> Registered. A store failure means the connection was never
    // registered; surface it as a failed handshake and close.
    if let Err(e) = registry.register(&identity, &connection_id, tx.clone()).await {
        tracing::error!(
            namespace = namespace.label(),
            identity = %identity,
            error = %e,
            "Registration failed, closing connection"
        );
        drop(tx);
        let _ = writer_task.await;
        return;
    }

    // Read loop while Registered
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                // recipientId is accepted, not forwarded; content routing is
                // the caller's job, built on the delivery operations.
                match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(inbound) => {
                        tracing::debug!(
                            connection_id = %connection_id,
                            recipient_id = ?inbound.recipient_id,
                            "Message received"
                        );
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "Unparseable message");
                    }
                }
                // Every inbound message gets the fixed receipt ack.
                let _ = tx.send(OutboundFrame::Ack(Ack::ok()));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Connection error");
                break;
            }
        }
    }

    // Registered -> Closed, identical for graceful and abnormal disconnects.
    // Unregistering drops the registry's sender clone; once the local clone
    // goes too, the writer drains whatever is queued and exits.
    if let Err(e) = registry.unregister(&connection_id).await {
        tracing::error!(
            namespace = namespace.label(),
            connection_id = %connection_id,
            error = %e,
            "Failed to remove registry entry on disconnect"
        );
    }
    drop(tx);
    let _ = writer_task.await;
}
