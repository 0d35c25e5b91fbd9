//! Room registry
//!
//! The registry lock guards the code -> room map only. It is never held
//! while a room's own lock is taken; room inspection always happens on
//! cloned `Arc<Room>`s after the registry lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use planpoker_core::config::RoomsConfig;
use planpoker_core::invariants::assert_room_code_valid;
use planpoker_core::{RoomRepository, RoomSnapshot, RoomState, VotingScale};
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::ServerMessage;
use crate::room::Room;

/// Room code length
pub const CODE_LEN: usize = 6;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub rooms: usize,
    pub participants: usize,
}

/// A freshly created room and the capability token for its host
pub struct CreatedRoom {
    pub room: Arc<Room>,
    pub host_token: String,
}

enum PersistOp {
    Save(Box<RoomSnapshot>),
    Delete(String),
    Flush(oneshot::Sender<()>),
}

pub struct Hub {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    config: RoomsConfig,
    persist_tx: Option<mpsc::UnboundedSender<PersistOp>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Hub {
    /// Build the registry, restore persisted rooms, and start the sweep
    pub async fn start(config: RoomsConfig, repo: Option<Arc<dyn RoomRepository>>) -> Arc<Self> {
        let mut rooms = HashMap::new();

        let persist_tx = match repo {
            Some(repo) => {
                for snapshot in load_snapshots(&repo).await {
                    if rooms.len() >= config.max_rooms {
                        warn!(room = %snapshot.code, "Room limit reached, not restoring");
                        continue;
                    }
                    let room = Room::restore(&snapshot, config.max_participants);
                    rooms.insert(room.code().to_ascii_uppercase(), room);
                }
                if !rooms.is_empty() {
                    info!(count = rooms.len(), "Restored rooms");
                }

                let (tx, rx) = mpsc::unbounded_channel();
                tokio::task::spawn_blocking(move || persistence_worker(repo, rx));
                Some(tx)
            }
            None => None,
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let hub = Arc::new(Self {
            rooms: RwLock::new(rooms),
            config,
            persist_tx,
            shutdown_tx,
        });

        tokio::spawn(sweep_task(
            Arc::downgrade(&hub),
            hub.config.sweep_interval(),
            hub.shutdown_tx.subscribe(),
        ));

        hub
    }

    pub fn config(&self) -> &RoomsConfig {
        &self.config
    }

    /// Register a new room under an unused code
    pub async fn create_room(
        &self,
        expiry_hours: Option<u32>,
        scale: VotingScale,
    ) -> Result<CreatedRoom> {
        let expiry_hours = expiry_hours
            .filter(|h| *h > 0)
            .unwrap_or(self.config.default_expiry_hours);
        let host_token = generate_host_token();

        let room = {
            let mut rooms = self.rooms.write().await;
            if rooms.len() >= self.config.max_rooms {
                warn!(max_rooms = self.config.max_rooms, "Room limit reached");
                return Err(Error::RegistryFull);
            }

            let code = loop {
                let candidate = generate_code();
                if !rooms.contains_key(&candidate) {
                    break candidate;
                }
            };
            assert_room_code_valid(&code);

            let room = Room::new(RoomState::new(
                code.clone(),
                host_token.clone(),
                expiry_hours,
                scale,
                self.config.max_participants,
            ));
            rooms.insert(code, room.clone());
            room
        };

        info!(room = %room.code(), expiry_hours, scale = room.scale().kind.as_str(), "Room created");
        self.save_room(&room).await;

        Ok(CreatedRoom { room, host_token })
    }

    /// Look up a room; codes are case-insensitive
    pub async fn get_room(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(&normalize_code(code)).cloned()
    }

    /// Remove a room and its snapshot. Anyone still attached is told and
    /// disconnected. Returns false if no such room was registered.
    pub async fn delete_room(&self, code: &str) -> bool {
        let code = normalize_code(code);
        let removed = {
            let mut rooms = self.rooms.write().await;
            let removed = rooms.remove(&code);
            if removed.is_some() {
                self.persist(PersistOp::Delete(code.clone()));
            }
            removed
        };

        let Some(room) = removed else {
            return false;
        };
        room.close(ServerMessage::RoomClosed {
            reason: "room deleted".to_string(),
        })
        .await;

        info!(room = %code, "Room deleted");
        true
    }

    /// Delete the room after the grace period if it stays empty until then.
    ///
    /// A participant joining (and even leaving again) during the grace
    /// period cancels this particular deletion.
    pub async fn schedule_delete_if_empty(
        self: &Arc<Self>,
        code: &str,
    ) -> Option<JoinHandle<bool>> {
        let room = self.get_room(code).await?;
        let epoch = room.empty_epoch().await?;
        let hub = Arc::downgrade(self);
        let grace = self.config.grace_period();

        debug!(room = %room.code(), grace_secs = grace.as_secs(), "Room empty, grace period started");
        Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            let Some(hub) = hub.upgrade() else {
                return false;
            };
            if !room.retire_if_empty_since(epoch).await {
                return false;
            }
            let removed = hub.remove_retired(&room).await;
            if removed {
                info!(room = %room.code(), "Room deleted after grace period");
            }
            removed
        }))
    }

    /// Remove every empty or expired room
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let candidates: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();

        let mut removed = 0;
        for room in candidates {
            if room.retire_if_stale(now).await && self.remove_retired(&room).await {
                debug!(room = %room.code(), "Swept room");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Swept stale rooms");
        }
        removed
    }

    pub async fn stats(&self) -> HubStats {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();

        let mut participants = 0;
        for room in &rooms {
            participants += room.participant_count().await;
        }

        HubStats {
            rooms: rooms.len(),
            participants,
        }
    }

    /// Queue a snapshot of the room for persistence.
    ///
    /// Rooms no longer in the registry are skipped so a late save cannot
    /// bring back a deleted room.
    pub async fn save_room(&self, room: &Arc<Room>) {
        if self.persist_tx.is_none() {
            return;
        }
        let snapshot = room.to_snapshot().await;

        let rooms = self.rooms.read().await;
        if rooms
            .get(room.code())
            .is_some_and(|current| Arc::ptr_eq(current, room))
        {
            self.persist(PersistOp::Save(Box::new(snapshot)));
        }
    }

    /// Wait until every queued persistence operation has been applied
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.persist(PersistOp::Flush(tx));
        let _ = rx.await;
    }

    /// Stop the sweep and tell every attached participant the server is
    /// going away. Rooms stay registered so their snapshots survive.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();
        for room in rooms {
            room.close(ServerMessage::ServerShutdown).await;
        }
        info!("Hub shut down");
    }

    async fn remove_retired(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.rooms.write().await;
        let registered = rooms
            .get(room.code())
            .is_some_and(|current| Arc::ptr_eq(current, room));
        if registered {
            rooms.remove(room.code());
            self.persist(PersistOp::Delete(room.code().to_string()));
        }
        registered
    }

    fn persist(&self, op: PersistOp) {
        if let Some(tx) = &self.persist_tx {
            if tx.send(op).is_err() {
                warn!("Persistence worker is gone, dropping operation");
            }
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// 32 hex chars from a v4 UUID
fn generate_host_token() -> String {
    Uuid::new_v4().simple().to_string()
}

async fn load_snapshots(repo: &Arc<dyn RoomRepository>) -> Vec<RoomSnapshot> {
    let repo = repo.clone();
    match tokio::task::spawn_blocking(move || repo.list_rooms()).await {
        Ok(Ok(snapshots)) => snapshots,
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to load persisted rooms");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "Room restore task failed");
            Vec::new()
        }
    }
}

/// Apply persistence operations in order, off the async runtime
fn persistence_worker(repo: Arc<dyn RoomRepository>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.blocking_recv() {
        match op {
            PersistOp::Save(snapshot) => {
                if let Err(e) = repo.save_room(&snapshot) {
                    warn!(room = %snapshot.code, error = %e, "Failed to persist room");
                }
            }
            PersistOp::Delete(code) => {
                if let Err(e) = repo.delete_room(&code) {
                    warn!(room = %code, error = %e, "Failed to delete persisted room");
                }
            }
            PersistOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Persistence worker stopped");
}

async fn sweep_task(hub: Weak<Hub>, every: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(hub) = hub.upgrade() else { break };
                hub.sweep().await;
            }
            _ = shutdown_rx.recv() => {
                debug!("Sweep task shutting down");
                break;
            }
        }
    }
}
