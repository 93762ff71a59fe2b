//! Per-connection handling: the HELLO handshake deadline, then a read/dispatch loop
//! paired with a dedicated send task, mirroring the teacher's split-socket,
//! channel-fed-sender pattern so that a slow client can't block message production.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::model::{ClientMessage, PlayerId, ServerMessage};
use crate::store::CoordinationStore;

use super::dispatch;
use super::registry::ConnectionRegistry;

const SEND_QUEUE_CAPACITY: usize = 32;

pub async fn handle_socket(
    socket: WebSocket,
    store: Arc<dyn CoordinationStore>,
    registry: Arc<ConnectionRegistry>,
    config: GatewayConfig,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(SEND_QUEUE_CAPACITY);

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&message) else {
                warn!("failed to serialize outgoing server message");
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let Some(player_id) = await_hello(&mut receiver, &tx, store.as_ref(), &config).await else {
        drop(tx);
        let _ = send_task.await;
        return;
    };

    registry.insert(player_id, tx.clone());
    info!(%player_id, "gateway connection established");

    let mut left_explicitly = false;
    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(%player_id, error = %err, "websocket stream error, closing connection");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if !dispatch_client_message(&text, player_id, &tx, store.as_ref(), &config).await {
                    left_explicitly = true;
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if !left_explicitly {
        if let Err(err) = dispatch::handle_disconnect(store.as_ref(), player_id, config.player_ttl_s).await {
            warn!(%player_id, error = %err, "failed to write disconnect state");
        }
    }
    registry.remove(&player_id);
    drop(tx);
    let _ = send_task.await;
    info!(%player_id, "gateway connection closed");
}

/// Wait for `HELLO` within the configured deadline. Returns `None` (and the caller
/// closes the socket) on timeout, stream end, or a non-HELLO first message.
async fn await_hello(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    tx: &mpsc::Sender<ServerMessage>,
    store: &dyn CoordinationStore,
    config: &GatewayConfig,
) -> Option<PlayerId> {
    let deadline = Instant::now() + Duration::from_millis(config.hello_timeout_ms);

    let message = tokio::select! {
        message = receiver.next() => message,
        () = tokio::time::sleep_until(deadline) => {
            warn!(timeout_ms = config.hello_timeout_ms, "HELLO handshake timed out, closing connection");
            None
        }
    }?;

    let message = message.ok()?;
    let Message::Text(text) = message else {
        let _ = tx
            .send(ServerMessage::Error {
                code: "PROTOCOL",
                message: "expected HELLO as the first message".to_string(),
            })
            .await;
        return None;
    };

    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Hello { player_id }) => {
            match dispatch::handle_hello(store, player_id, config.player_ttl_s).await {
                Ok((id, state)) => {
                    let _ = tx.send(ServerMessage::Welcome { player_id: id }).await;
                    let _ = tx.send(ServerMessage::State { state }).await;
                    Some(id)
                }
                Err(err) => {
                    warn!(error = %err, "store error during HELLO, closing connection");
                    None
                }
            }
        }
        _ => {
            let _ = tx
                .send(ServerMessage::Error {
                    code: "PROTOCOL",
                    message: "expected HELLO as the first message".to_string(),
                })
                .await;
            None
        }
    }
}

/// Dispatch one post-HELLO frame. Returns `false` if the connection should close
/// (LEAVE was processed).
async fn dispatch_client_message(
    text: &str,
    player_id: PlayerId,
    tx: &mpsc::Sender<ServerMessage>,
    store: &dyn CoordinationStore,
    config: &GatewayConfig,
) -> bool {
    let client_message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(%player_id, error = %err, "rejected malformed client message");
            let _ = tx
                .send(ServerMessage::Error {
                    code: "UNKNOWN",
                    message: "malformed or unrecognized message".to_string(),
                })
                .await;
            return true;
        }
    };

    let result = match client_message {
        ClientMessage::Hello { .. } => {
            debug!(%player_id, "ignoring duplicate HELLO on an established connection");
            Ok(())
        }
        ClientMessage::ReadyUp => dispatch::handle_ready_up(store, player_id, config.player_ttl_s).await,
        ClientMessage::Unready => dispatch::handle_unready(store, player_id, config.player_ttl_s).await,
        ClientMessage::Heartbeat => dispatch::handle_heartbeat(store, player_id, config.player_ttl_s).await,
        ClientMessage::Leave => {
            let outcome = dispatch::handle_leave(store, player_id, config.player_ttl_s).await;
            if outcome.is_ok() {
                return false;
            }
            outcome
        }
    };

    if let Err(err) = result {
        warn!(%player_id, error = %err, "store error handling client message, swallowing");
    }
    true
}
