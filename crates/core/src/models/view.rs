//! Broadcastable views of room state

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ParticipantView, VotingScale};

/// Full room state as sent to one viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    pub code: String,
    pub participants: Vec<ParticipantView>,
    pub revealed: bool,
    pub current_participant_id: Uuid,
    pub host_id: Option<Uuid>,
    pub scale: VotingScale,
    /// Unix timestamp in milliseconds, absent when no timer runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_end_time: Option<i64>,
    pub timer_auto_reveal: bool,
}

impl RoomView {
    pub fn participant(&self, id: Uuid) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| p.id == id)
    }
}

/// Outcome of a reveal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResults {
    /// Participant id -> token, for participants who voted
    pub votes: HashMap<Uuid, String>,
    /// Mean of the numeric votes, 0 when there are none
    pub average: f64,
    pub revealed: bool,
}
