use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use super::room::{CollabConfig, DocRoom, RoomCommand};

/// Live counters a room task publishes after every processed event.
#[derive(Debug, Default)]
pub struct RoomMetrics {
    connections: AtomicUsize,
    users: AtomicUsize,
    pending_save: AtomicBool,
}

impl RoomMetrics {
    pub(crate) fn publish(&self, connections: usize, users: usize, pending_save: bool) {
        self.connections.store(connections, Ordering::Relaxed);
        self.users.store(users, Ordering::Relaxed);
        self.pending_save.store(pending_save, Ordering::Relaxed);
    }
}

/// Aggregated view over all live rooms, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms: usize,
    pub connections: usize,
    pub users: usize,
    pub pending_saves: usize,
}

struct RoomHandle {
    instance: u64,
    tx: mpsc::UnboundedSender<RoomCommand>,
    metrics: Arc<RoomMetrics>,
}

/// DocumentId → room mailbox. This is the only state shared across
/// documents; the lock covers map operations only, never I/O, so a slow
/// store call for one document cannot stall another.
pub struct RoomRegistry {
    config: CollabConfig,
    rooms: Mutex<HashMap<Uuid, RoomHandle>>,
    next_instance: AtomicU64,
    // Handed to spawned rooms so they can retire themselves and re-route
    // late joins.
    self_ref: Weak<RoomRegistry>,
}

impl RoomRegistry {
    pub fn new(config: CollabConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            rooms: Mutex::new(HashMap::new()),
            next_instance: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        })
    }

    /// Route a command to the document's room. A join spawns the room when
    /// none is live; any other command for an absent room is dropped, so
    /// stray traffic can never resurrect one.
    pub fn dispatch(&self, doc_id: Uuid, command: RoomCommand) {
        let mut command = command;
        loop {
            let tx = {
                let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
                match rooms.get(&doc_id) {
                    Some(handle) => handle.tx.clone(),
                    None if matches!(command, RoomCommand::Join { .. }) => {
                        self.spawn_room(&mut rooms, doc_id)
                    }
                    None => return,
                }
            };
            match tx.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // The room retired between lookup and send. Drop the
                    // dead handle (only if it has not been replaced) and
                    // try again.
                    command = returned;
                    let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
                    if rooms.get(&doc_id).map(|h| h.tx.is_closed()) == Some(true) {
                        rooms.remove(&doc_id);
                    }
                }
            }
        }
    }

    fn spawn_room(
        &self,
        rooms: &mut HashMap<Uuid, RoomHandle>,
        doc_id: Uuid,
    ) -> mpsc::UnboundedSender<RoomCommand> {
        let registry = self
            .self_ref
            .upgrade()
            .expect("registry dropped while dispatching");
        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
        let metrics = Arc::new(RoomMetrics::default());
        info!("Opening room for document {}", doc_id);
        let tx = DocRoom::spawn(
            doc_id,
            instance,
            self.config.clone(),
            registry,
            Arc::clone(&metrics),
        );
        rooms.insert(
            doc_id,
            RoomHandle {
                instance,
                tx: tx.clone(),
                metrics,
            },
        );
        tx
    }

    /// Called by a room as it shuts down. The instance check keeps a
    /// retiring room from evicting a newer one under the same document.
    pub(crate) fn retire(&self, doc_id: Uuid, instance: u64) {
        let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
        if rooms.get(&doc_id).map(|h| h.instance) == Some(instance) {
            rooms.remove(&doc_id);
            info!("Retired room for document {}", doc_id);
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.lock().expect("room registry lock poisoned");
        let mut stats = RegistryStats {
            rooms: rooms.len(),
            ..Default::default()
        };
        for handle in rooms.values() {
            stats.connections += handle.metrics.connections.load(Ordering::Relaxed);
            stats.users += handle.metrics.users.load(Ordering::Relaxed);
            if handle.metrics.pending_save.load(Ordering::Relaxed) {
                stats.pending_saves += 1;
            }
        }
        stats
    }
}
