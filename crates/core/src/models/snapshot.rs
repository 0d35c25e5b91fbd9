//! Persisted room snapshot
//!
//! Everything needed to rebuild a room's logical state after a restart.
//! Live connections are not part of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::VotingScale;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: String,
    pub host_id: Option<Uuid>,
    pub host_token: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expiry_hours: u32,
    pub scale: VotingScale,
    pub timer_end_time: Option<DateTime<Utc>>,
    pub timer_auto_reveal: bool,
    pub revealed: bool,
    pub participants: Vec<ParticipantSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    pub vote: Option<String>,
    pub is_host: bool,
}
