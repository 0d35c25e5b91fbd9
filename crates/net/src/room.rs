//! Synchronized room
//!
//! Wraps [`RoomState`] and the room's connections in one mutex. Every
//! mutation enqueues its broadcasts before the lock is released, so all
//! participants see a room's events in the same order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use planpoker_core::{
    Participant, RoomError, RoomSnapshot, RoomState, RoomView, VotingScale,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::protocol::ServerMessage;
use crate::timer::{spawn_countdown, ActiveTimer};

/// What a departure changed
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub participant: Option<Participant>,
    /// Host after the departure, unchanged unless the host left
    pub new_host_id: Option<Uuid>,
    pub now_empty: bool,
}

pub struct Room {
    code: String,
    scale: VotingScale,
    expiry_hours: u32,
    inner: Mutex<RoomInner>,
}

struct RoomInner {
    state: RoomState,
    connections: HashMap<Uuid, ConnectionHandle>,
    timer: Option<ActiveTimer>,
    timer_generation: u64,
    /// Bumped every time the room becomes empty
    empty_epoch: u64,
    /// Set once the room is leaving the registry; no further joins
    retired: bool,
}

impl RoomInner {
    fn broadcast(&self, msg: &ServerMessage) {
        for conn in self.connections.values() {
            conn.send(msg.clone());
        }
    }

    fn broadcast_except(&self, msg: &ServerMessage, except: Uuid) {
        for conn in self.connections.values() {
            if conn.id() != except {
                conn.send(msg.clone());
            }
        }
    }

    /// Send every participant its own full view
    fn sync_all(&self) {
        for (id, conn) in &self.connections {
            conn.send(ServerMessage::Sync(self.state.snapshot_for(*id)));
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
            self.state.clear_timer();
        }
    }

    fn retire(&mut self, farewell: Option<ServerMessage>) {
        self.retired = true;
        self.cancel_timer();
        if let Some(msg) = farewell {
            self.broadcast(&msg);
        }
        for conn in self.connections.values() {
            conn.close();
        }
    }
}

impl Room {
    pub fn new(state: RoomState) -> Arc<Self> {
        Arc::new(Self {
            code: state.code().to_string(),
            scale: state.scale().clone(),
            expiry_hours: state.expiry_hours(),
            inner: Mutex::new(RoomInner {
                state,
                connections: HashMap::new(),
                timer: None,
                timer_generation: 0,
                empty_epoch: 0,
                retired: false,
            }),
        })
    }

    /// Rebuild a persisted room. It starts empty.
    pub fn restore(snapshot: &RoomSnapshot, max_participants: usize) -> Arc<Self> {
        Self::new(RoomState::restore(snapshot, max_participants))
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn scale(&self) -> &VotingScale {
        &self.scale
    }

    pub fn expiry_hours(&self) -> u32 {
        self.expiry_hours
    }

    /// Attach a connection as a new participant.
    ///
    /// The joiner gets a full `sync`; everyone else gets `participant_joined`.
    /// A joiner presenting the host token takes host rights, in which case
    /// everyone is re-synced so the demotion is visible.
    pub async fn join(
        &self,
        conn: ConnectionHandle,
        name: &str,
        host_token: Option<&str>,
    ) -> Result<Participant, RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.retired {
            return Err(RoomError::Closed);
        }

        let id = conn.id();
        let claim_host = host_token.is_some_and(|t| inner.state.token_matches(t));
        let previous_host = inner.state.host_id();
        let participant = inner.state.add_participant(id, name, claim_host)?;
        inner.connections.insert(id, conn.clone());

        if claim_host && previous_host.is_some() {
            inner.sync_all();
        } else {
            conn.send(ServerMessage::Sync(inner.state.snapshot_for(id)));
            inner.broadcast_except(
                &ServerMessage::ParticipantJoined(participant.to_view(false)),
                id,
            );
        }

        info!(
            room = %self.code,
            participant_id = %id,
            name = %participant.name,
            is_host = participant.is_host,
            "Participant joined"
        );
        Ok(participant)
    }

    /// Detach a participant and tell everyone who is left
    pub async fn leave(&self, id: Uuid) -> LeaveOutcome {
        let mut inner = self.inner.lock().await;
        inner.connections.remove(&id);

        let Some(participant) = inner.state.remove_participant(id) else {
            return LeaveOutcome {
                participant: None,
                new_host_id: None,
                now_empty: inner.state.is_empty(),
            };
        };

        let new_host_id = inner.state.host_id();
        inner.broadcast(&ServerMessage::ParticipantLeft {
            participant_id: id,
            new_host_id,
        });

        let now_empty = inner.state.is_empty();
        if now_empty {
            inner.empty_epoch += 1;
            inner.cancel_timer();
        }

        info!(room = %self.code, participant_id = %id, ?new_host_id, "Participant left");
        LeaveOutcome {
            participant: Some(participant),
            new_host_id,
            now_empty,
        }
    }

    pub async fn vote(&self, id: Uuid, token: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        inner.state.vote(id, token)?;
        let has_voted = inner
            .state
            .participant(id)
            .is_some_and(Participant::has_voted);

        inner.broadcast(&ServerMessage::Voted {
            participant_id: id,
            has_voted,
        });
        Ok(())
    }

    pub async fn reveal(&self, requester: Uuid) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        inner.state.reveal(requester)?;
        let results = inner.state.compute_results();

        debug!(room = %self.code, average = results.average, "Votes revealed");
        inner.broadcast(&ServerMessage::Revealed(results));
        Ok(())
    }

    /// Start a new round. Host only.
    pub async fn reset(&self, requester: Uuid) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_host(requester) {
            return Err(RoomError::NotHost("reset the round"));
        }
        inner.state.reset();
        inner.sync_all();
        Ok(())
    }

    /// Arm the round timer, cancelling any countdown already running
    pub async fn start_timer(
        self: &Arc<Self>,
        requester: Uuid,
        duration_secs: u64,
        auto_reveal: bool,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        let spec = inner.state.start_timer(requester, duration_secs, auto_reveal)?;

        if let Some(previous) = inner.timer.take() {
            previous.stop();
        }
        inner.timer_generation += 1;
        let generation = inner.timer_generation;
        let cancel = CancellationToken::new();
        inner.timer = Some(ActiveTimer {
            generation,
            cancel: cancel.clone(),
        });

        inner.broadcast(&ServerMessage::TimerSync {
            end_time: spec.deadline.timestamp_millis(),
            auto_reveal: spec.auto_reveal,
        });

        spawn_countdown(
            Arc::downgrade(self),
            generation,
            Instant::now() + Duration::from_secs(duration_secs),
            cancel,
        );
        debug!(room = %self.code, generation, duration_secs, auto_reveal, "Timer started");
        Ok(())
    }

    pub async fn stop_timer(&self, requester: Uuid) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        inner.state.stop_timer(requester)?;
        if let Some(timer) = inner.timer.take() {
            timer.stop();
        }

        inner.broadcast(&ServerMessage::TimerSync {
            end_time: 0,
            auto_reveal: false,
        });
        Ok(())
    }

    /// Called by the countdown when its deadline passes
    pub(crate) async fn expire_timer(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.timer.as_ref().map(|t| t.generation) != Some(generation) {
            return;
        }
        inner.timer = None;
        let spec = inner.state.clear_timer();

        inner.broadcast(&ServerMessage::TimerEnded);
        if spec.is_some_and(|s| s.auto_reveal) && inner.state.auto_reveal() {
            let results = inner.state.compute_results();
            inner.broadcast(&ServerMessage::Revealed(results));
        }
        debug!(room = %self.code, generation, "Timer ended");
    }

    pub async fn broadcast(&self, msg: ServerMessage) {
        self.inner.lock().await.broadcast(&msg);
    }

    pub async fn broadcast_except(&self, msg: ServerMessage, except: Uuid) {
        self.inner.lock().await.broadcast_except(&msg, except);
    }

    pub async fn snapshot_for(&self, viewer: Uuid) -> RoomView {
        self.inner.lock().await.state.snapshot_for(viewer)
    }

    pub async fn host_id(&self) -> Option<Uuid> {
        self.inner.lock().await.state.host_id()
    }

    pub async fn participant_count(&self) -> usize {
        self.inner.lock().await.state.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.state.is_empty()
    }

    pub async fn to_snapshot(&self) -> RoomSnapshot {
        self.inner.lock().await.state.to_snapshot()
    }

    /// The current empty epoch, or `None` if someone is seated
    pub(crate) async fn empty_epoch(&self) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.state.is_empty().then_some(inner.empty_epoch)
    }

    /// Retire the room if it has stayed empty since `epoch`
    pub(crate) async fn retire_if_empty_since(&self, epoch: u64) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.retired || !inner.state.is_empty() || inner.empty_epoch != epoch {
            return false;
        }
        inner.retire(None);
        true
    }

    /// Retire the room if it is empty or expired. Expired rooms with
    /// participants still attached are closed under them.
    pub(crate) async fn retire_if_stale(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.retired {
            return false;
        }
        if inner.state.is_empty() {
            inner.retire(None);
            return true;
        }
        if inner.state.is_expired(now) {
            inner.retire(Some(ServerMessage::RoomClosed {
                reason: "room expired".to_string(),
            }));
            return true;
        }
        false
    }

    /// Retire the room, sending `farewell` to everyone still attached
    pub async fn close(&self, farewell: ServerMessage) {
        self.inner.lock().await.retire(Some(farewell));
    }
}
