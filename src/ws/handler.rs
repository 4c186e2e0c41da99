use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collab::{RoomCommand, RoomRegistry};
use crate::models::{ClientMessage, CollabError, Principal, ServerMessage};
use crate::services::auth_service;
use crate::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    // The principal is resolved before the socket is accepted; an
    // unauthenticated upgrade never reaches the collaboration core.
    let principal = match auth_service::resolve_principal(&headers, query.token.as_deref()).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!("Rejecting WebSocket connection: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, principal, app_state))
}

/// Handle one accepted WebSocket connection
async fn handle_socket(socket: WebSocket, principal: Principal, app_state: Arc<AppState>) {
    let conn_id = Uuid::new_v4();
    info!("User connected: {} ({})", principal.username, conn_id);

    let (mut sink, mut stream) = socket.split();

    // Rooms deliver events through this channel; a single pump task writes
    // them to the socket in order.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Documents this connection has joined, read by the teardown below. A
    // connection holds at most one join in practice, but the teardown
    // iterates whatever is here.
    let joined: Arc<Mutex<HashSet<Uuid>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let registry = Arc::clone(&app_state.registry);
    let reader_registry = Arc::clone(&registry);
    let reader_joined = Arc::clone(&joined);
    let reader_principal = principal.clone();
    let reader_tx = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            let message = match result {
                Ok(message) => message,
                Err(_) => break,
            };
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                // Ping/pong are handled by the transport; binary frames are
                // not part of the protocol.
                _ => continue,
            };
            let parsed: ClientMessage = match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Malformed message on connection {}: {}", conn_id, e);
                    let err = CollabError::Protocol("Invalid message format".to_string());
                    let _ = reader_tx.send(ServerMessage::error(err.client_message()));
                    continue;
                }
            };
            handle_client_message(
                parsed,
                conn_id,
                &reader_principal,
                &reader_tx,
                &reader_registry,
                &reader_joined,
            );
        }
    });

    // Whichever side finishes first tears the other down.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Disconnect teardown runs for every document the connection joined.
    let docs: Vec<Uuid> = {
        let mut joined = joined.lock().expect("joined set lock poisoned");
        joined.drain().collect()
    };
    for doc_id in docs {
        registry.dispatch(doc_id, RoomCommand::Disconnect { conn_id });
    }
    info!("User disconnected: {} ({})", principal.username, conn_id);
}

fn handle_client_message(
    message: ClientMessage,
    conn_id: Uuid,
    principal: &Principal,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    registry: &Arc<RoomRegistry>,
    joined: &Arc<Mutex<HashSet<Uuid>>>,
) {
    match message {
        ClientMessage::JoinDocument(msg) => {
            joined
                .lock()
                .expect("joined set lock poisoned")
                .insert(msg.document_id);
            registry.dispatch(
                msg.document_id,
                RoomCommand::Join {
                    conn_id,
                    principal: principal.clone(),
                    tx: tx.clone(),
                },
            );
        }
        ClientMessage::LeaveDocument(msg) => {
            let was_joined = joined
                .lock()
                .expect("joined set lock poisoned")
                .remove(&msg.document_id);
            if was_joined {
                registry.dispatch(msg.document_id, RoomCommand::Leave { conn_id });
            } else {
                let _ = tx.send(ServerMessage::error(CollabError::not_joined().client_message()));
            }
        }
        ClientMessage::TextChange(msg) => {
            if is_joined(joined, msg.document_id) {
                registry.dispatch(
                    msg.document_id,
                    RoomCommand::TextChange {
                        conn_id,
                        delta: msg.delta,
                        content: msg.content,
                    },
                );
            } else {
                let _ = tx.send(ServerMessage::error(CollabError::not_joined().client_message()));
            }
        }
        ClientMessage::CursorMove(msg) => {
            if is_joined(joined, msg.document_id) {
                registry.dispatch(
                    msg.document_id,
                    RoomCommand::CursorMove {
                        conn_id,
                        position: msg.position,
                    },
                );
            } else {
                let _ = tx.send(ServerMessage::error(CollabError::not_joined().client_message()));
            }
        }
    }
}

fn is_joined(joined: &Arc<Mutex<HashSet<Uuid>>>, doc_id: Uuid) -> bool {
    joined
        .lock()
        .expect("joined set lock poisoned")
        .contains(&doc_id)
}
