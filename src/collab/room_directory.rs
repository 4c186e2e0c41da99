use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::models::ServerMessage;

/// The live connections of one document's room, each with its outbound
/// channel. All sends happen from the owning room task, so every receiver
/// observes events in processing order.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    conns: HashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conn_id: Uuid, tx: mpsc::UnboundedSender<ServerMessage>) {
        self.conns.insert(conn_id, tx);
    }

    pub fn remove(&mut self, conn_id: Uuid) -> bool {
        self.conns.remove(&conn_id).is_some()
    }

    /// Deliver to a single connection. A closed channel just means the
    /// connection is going away; its disconnect will clean up.
    pub fn send_to(&self, conn_id: Uuid, message: ServerMessage) {
        if let Some(tx) = self.conns.get(&conn_id) {
            if tx.send(message).is_err() {
                debug!("Dropping message for closed connection {}", conn_id);
            }
        }
    }

    /// Deliver to every connection in the room except `exclude` (used so
    /// the author of a change does not receive an echo of it).
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<Uuid>) {
        for (conn_id, tx) in &self.conns {
            if Some(*conn_id) == exclude {
                continue;
            }
            if tx.send(message.clone()).is_err() {
                debug!("Dropping broadcast for closed connection {}", conn_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
