use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    ActiveUsersMessage, CollabError, CursorMoveBroadcast, DocumentSaveFailedMessage,
    DocumentSavedMessage, DocumentStateMessage, DocumentUpdate, Principal, ServerMessage,
    StoredDocument, TextChangeBroadcast, UserEventMessage,
};

use super::coalescer::SaveCoalescer;
use super::permissions;
use super::presence::PresenceRegistry;
use super::registry::{RoomMetrics, RoomRegistry};
use super::room_directory::RoomDirectory;

/// Loads a document (with its permission list) from the store.
pub type LoadDocumentFn = Arc<
    dyn Fn(Uuid) -> Pin<Box<dyn Future<Output = Result<Option<StoredDocument>, String>> + Send>>
        + Send
        + Sync,
>;

/// Persists the outcome of a coalesced save.
pub type SaveDocumentFn = Arc<
    dyn Fn(Uuid, DocumentUpdate) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>>
        + Send
        + Sync,
>;

/// How the collaboration core reaches its collaborators.
#[derive(Clone)]
pub struct CollabConfig {
    pub on_load_document: LoadDocumentFn,
    pub on_save_document: SaveDocumentFn,
    /// Quiet period after the last edit before the store is written.
    pub save_delay: Duration,
}

/// Everything a room can be asked to do. One mailbox per document,
/// consumed by one task, so commands for a document are handled strictly
/// in arrival order.
pub enum RoomCommand {
    Join {
        conn_id: Uuid,
        principal: Principal,
        tx: mpsc::UnboundedSender<ServerMessage>,
    },
    Leave {
        conn_id: Uuid,
    },
    Disconnect {
        conn_id: Uuid,
    },
    TextChange {
        conn_id: Uuid,
        delta: Option<serde_json::Value>,
        content: String,
    },
    CursorMove {
        conn_id: Uuid,
        position: serde_json::Value,
    },
    SaveTimerFired {
        generation: u64,
    },
}

/// The session coordinator for one document. Owns the presence registry,
/// the connection directory, the in-memory snapshot and the pending-save
/// state; nothing else touches them.
pub(crate) struct DocRoom {
    doc_id: Uuid,
    instance: u64,
    config: CollabConfig,
    registry: Arc<RoomRegistry>,
    metrics: Arc<RoomMetrics>,
    rx: mpsc::UnboundedReceiver<RoomCommand>,
    self_tx: mpsc::UnboundedSender<RoomCommand>,
    doc: Option<StoredDocument>,
    members: HashMap<Uuid, Principal>,
    presence: PresenceRegistry,
    directory: RoomDirectory,
    coalescer: SaveCoalescer,
    save_timer: Option<JoinHandle<()>>,
}

impl DocRoom {
    pub(crate) fn spawn(
        doc_id: Uuid,
        instance: u64,
        config: CollabConfig,
        registry: Arc<RoomRegistry>,
        metrics: Arc<RoomMetrics>,
    ) -> mpsc::UnboundedSender<RoomCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        let room = DocRoom {
            doc_id,
            instance,
            config,
            registry,
            metrics,
            rx,
            self_tx: tx.clone(),
            doc: None,
            members: HashMap::new(),
            presence: PresenceRegistry::new(),
            directory: RoomDirectory::new(),
            coalescer: SaveCoalescer::new(),
            save_timer: None,
        };
        tokio::spawn(room.run());
        tx
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
            self.metrics.publish(
                self.directory.len(),
                self.presence.user_count(),
                self.coalescer.is_armed(),
            );
            if self.directory.is_empty() && !self.coalescer.is_armed() {
                break;
            }
        }
        self.finish();
    }

    async fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                conn_id,
                principal,
                tx,
            } => self.handle_join(conn_id, principal, tx).await,
            RoomCommand::Leave { conn_id } => self.handle_departure(conn_id, false),
            RoomCommand::Disconnect { conn_id } => self.handle_departure(conn_id, true),
            RoomCommand::TextChange {
                conn_id,
                delta,
                content,
            } => self.handle_text_change(conn_id, delta, content),
            RoomCommand::CursorMove { conn_id, position } => {
                self.handle_cursor_move(conn_id, position)
            }
            RoomCommand::SaveTimerFired { generation } => {
                self.handle_save_timer(generation).await
            }
        }
    }

    /// Answer a failed join on the requesting connection only; the rest of
    /// the room never learns of it.
    fn reject(tx: &mpsc::UnboundedSender<ServerMessage>, err: CollabError) {
        let _ = tx.send(ServerMessage::error(err.client_message()));
    }

    async fn handle_join(
        &mut self,
        conn_id: Uuid,
        principal: Principal,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        // First live connection loads the snapshot; later joins reuse it.
        if self.doc.is_none() {
            match (self.config.on_load_document)(self.doc_id).await {
                Ok(Some(doc)) => self.doc = Some(doc),
                Ok(None) => {
                    Self::reject(&tx, CollabError::NotFound);
                    return;
                }
                Err(e) => {
                    let err = CollabError::StoreFailure(e);
                    error!("Failed to load document {}: {}", self.doc_id, err);
                    Self::reject(&tx, err);
                    return;
                }
            }
        }
        let Some(doc) = self.doc.as_ref() else { return };

        if !permissions::can_join(&principal, doc) {
            Self::reject(&tx, CollabError::access_denied());
            return;
        }

        let state = DocumentStateMessage {
            title: doc.title.clone(),
            content: doc.content.clone(),
        };

        self.members.insert(conn_id, principal.clone());
        self.presence.add_connection(&principal, conn_id);
        self.directory.add(conn_id, tx);
        info!(
            "{} joined document {} ({} connections)",
            principal.username,
            self.doc_id,
            self.directory.len()
        );

        self.directory.broadcast(
            &ServerMessage::UserJoined(UserEventMessage {
                user_id: principal.user_id,
                username: principal.username,
                timestamp: Utc::now(),
            }),
            Some(conn_id),
        );

        self.directory
            .send_to(conn_id, ServerMessage::DocumentState(state));

        let users = self.presence.list_active();
        self.directory.send_to(
            conn_id,
            ServerMessage::ActiveUsers(ActiveUsersMessage {
                users: users.clone(),
            }),
        );
        self.directory.broadcast(
            &ServerMessage::ActiveUsers(ActiveUsersMessage { users }),
            Some(conn_id),
        );
    }

    fn handle_departure(&mut self, conn_id: Uuid, cancel_pending_on_empty: bool) {
        if self.members.remove(&conn_id).is_none() {
            return;
        }
        self.directory.remove(conn_id);
        let Some(removed) = self.presence.remove_connection(conn_id) else {
            return;
        };
        if removed.user_gone {
            info!(
                "{} left document {} ({} connections remain)",
                removed.username,
                self.doc_id,
                self.directory.len()
            );
        } else {
            info!(
                "{} closed a connection to document {} but is still present",
                removed.username, self.doc_id
            );
        }

        self.directory.broadcast(
            &ServerMessage::UserLeft(UserEventMessage {
                user_id: removed.user_id,
                username: removed.username,
                timestamp: Utc::now(),
            }),
            None,
        );

        if !self.directory.is_empty() {
            self.directory.broadcast(
                &ServerMessage::ActiveUsers(ActiveUsersMessage {
                    users: self.presence.list_active(),
                }),
                None,
            );
        } else if cancel_pending_on_empty && self.coalescer.cancel() {
            // Transport loss of the last connection abandons the pending
            // save; an explicit leave keeps it armed until it fires.
            if let Some(timer) = self.save_timer.take() {
                timer.abort();
            }
            warn!(
                "Abandoning pending save for document {}: last connection dropped",
                self.doc_id
            );
        }
    }

    fn handle_text_change(
        &mut self,
        conn_id: Uuid,
        delta: Option<serde_json::Value>,
        content: String,
    ) {
        let Some(principal) = self.members.get(&conn_id).cloned() else {
            warn!(
                "Ignoring text-change from connection {} not joined to document {}",
                conn_id, self.doc_id
            );
            return;
        };
        let Some(doc) = self.doc.as_ref() else { return };

        if !permissions::can_edit(&principal, doc) {
            self.directory.send_to(
                conn_id,
                ServerMessage::error(CollabError::edit_denied().client_message()),
            );
            return;
        }

        let now = Utc::now();
        self.directory.broadcast(
            &ServerMessage::TextChange(TextChangeBroadcast {
                delta,
                content: content.clone(),
                user_id: principal.user_id.clone(),
                username: principal.username.clone(),
                timestamp: now,
            }),
            Some(conn_id),
        );

        // Last-writer-wins: the full content replaces the snapshot with no
        // merge. Concurrent edits from two users overwrite one another.
        if let Some(doc) = self.doc.as_mut() {
            doc.content = content;
            doc.last_modified = now;
            doc.last_modified_by = Some(principal.user_id);
        }

        self.arm_save();
    }

    fn handle_cursor_move(&mut self, conn_id: Uuid, position: serde_json::Value) {
        let Some(principal) = self.members.get(&conn_id).cloned() else {
            return;
        };
        self.directory.broadcast(
            &ServerMessage::CursorMove(CursorMoveBroadcast {
                user_id: principal.user_id,
                username: principal.username,
                position,
                timestamp: Utc::now(),
            }),
            Some(conn_id),
        );
    }

    /// Re-arm the debounce timer. The previous timer task is aborted and
    /// its generation invalidated, so edits arriving faster than the quiet
    /// period collapse into one write.
    fn arm_save(&mut self) {
        let generation = self.coalescer.arm();
        if let Some(timer) = self.save_timer.take() {
            timer.abort();
        }
        let tx = self.self_tx.clone();
        let delay = self.config.save_delay;
        self.save_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RoomCommand::SaveTimerFired { generation });
        }));
    }

    async fn handle_save_timer(&mut self, generation: u64) {
        if !self.coalescer.try_fire(generation) {
            // Replaced by a newer edit or cancelled; nothing to do.
            return;
        }
        self.save_timer = None;
        let Some(doc) = self.doc.as_ref() else { return };

        let update = DocumentUpdate {
            content: doc.content.clone(),
            last_modified: doc.last_modified,
            last_modified_by: doc.last_modified_by.clone(),
        };
        match (self.config.on_save_document)(self.doc_id, update).await {
            Ok(()) => {
                info!("Document {} saved", self.doc_id);
                self.directory.broadcast(
                    &ServerMessage::DocumentSaved(DocumentSavedMessage {
                        timestamp: Utc::now(),
                    }),
                    None,
                );
            }
            Err(e) => {
                // The snapshot stays as-is; the next edit re-arms the timer
                // and the save gets another chance.
                error!("Auto-save failed for document {}: {}", self.doc_id, e);
                self.directory.broadcast(
                    &ServerMessage::DocumentSaveFailed(DocumentSaveFailedMessage {
                        message: "Failed to save document".to_string(),
                        timestamp: Utc::now(),
                    }),
                    None,
                );
            }
        }
    }

    /// Leave the registry and drain the mailbox. A join that raced with
    /// retirement is re-routed so it lands on a fresh room instead of
    /// disappearing.
    fn finish(mut self) {
        self.registry.retire(self.doc_id, self.instance);
        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            if matches!(command, RoomCommand::Join { .. }) {
                self.registry.dispatch(self.doc_id, command);
            }
        }
        if let Some(timer) = self.save_timer.take() {
            timer.abort();
        }
        info!("Room for document {} closed", self.doc_id);
    }
}
