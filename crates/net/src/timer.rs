//! Round timer countdown
//!
//! Each start gets a fresh cancellation token and generation number. The
//! countdown only acts if the room still holds the same generation when
//! the deadline passes, so a restarted or stopped timer never fires.

use std::sync::Weak;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::room::Room;

/// The running countdown of one room
#[derive(Debug)]
pub(crate) struct ActiveTimer {
    pub generation: u64,
    pub cancel: CancellationToken,
}

impl ActiveTimer {
    pub fn stop(self) {
        self.cancel.cancel();
    }
}

pub(crate) fn spawn_countdown(
    room: Weak<Room>,
    generation: u64,
    deadline: Instant,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, "Timer cancelled");
            }
            _ = tokio::time::sleep_until(deadline) => {
                if let Some(room) = room.upgrade() {
                    room.expire_timer(generation).await;
                }
            }
        }
    })
}
