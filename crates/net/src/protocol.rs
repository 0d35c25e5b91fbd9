//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire. Both
//! directions are tagged by a snake_case `"type"` field.

use planpoker_core::{ParticipantView, RoomView, VoteResults, VotingScale};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Frames sent by a client.
///
/// The first group is answered before a connection joins a room; the rest
/// are room commands and need a joined connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        /// Non-positive or absent means the configured default
        #[serde(default)]
        expiry_hours: Option<i64>,
        /// Preset name, or "custom" together with `custom_values`
        #[serde(default)]
        scale: Option<String>,
        #[serde(default)]
        custom_values: Option<Vec<String>>,
    },
    GetRoom {
        code: String,
    },
    CheckRoom {
        code: String,
    },
    ListScales,
    Stats,
    Join {
        room_code: String,
        name: String,
        #[serde(default)]
        host_token: Option<String>,
    },

    /// Empty token clears the vote
    Vote {
        #[serde(default)]
        vote: String,
    },
    Reveal,
    Reset,
    StartTimer {
        #[serde(default)]
        timer_duration: u64,
        #[serde(default)]
        auto_reveal: bool,
    },
    StopTimer,
    Ping,
}

impl ClientMessage {
    /// Every accepted `"type"` tag
    pub const TYPES: &'static [&'static str] = &[
        "create_room",
        "get_room",
        "check_room",
        "list_scales",
        "stats",
        "join",
        "vote",
        "reveal",
        "reset",
        "start_timer",
        "stop_timer",
        "ping",
    ];

    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a frame payload, telling unknown types apart from bad shapes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            let kind = serde_json::from_slice::<serde_json::Value>(bytes)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned));

            match kind {
                Some(kind) if !Self::TYPES.contains(&kind.as_str()) => {
                    Error::Protocol(format!("unknown message type: {kind}"))
                }
                _ => Error::Protocol(format!("malformed message: {e}")),
            }
        })
    }
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated {
        code: String,
        host_token: String,
        expiry_hours: u32,
        scale: VotingScale,
    },
    RoomInfo {
        code: String,
        participant_count: usize,
        expiry_hours: u32,
        scale: VotingScale,
    },
    RoomCheck {
        exists: bool,
        participant_count: usize,
    },
    Scales {
        scales: Vec<VotingScale>,
    },
    Stats {
        rooms: usize,
        participants: usize,
    },
    JoinRejected {
        reason: String,
    },

    /// Full state for the receiving participant
    Sync(RoomView),
    ParticipantJoined(ParticipantView),
    ParticipantLeft {
        participant_id: Uuid,
        new_host_id: Option<Uuid>,
    },
    Voted {
        participant_id: Uuid,
        has_voted: bool,
    },
    Revealed(VoteResults),
    /// `end_time` is unix milliseconds, 0 when the timer was stopped
    TimerSync {
        end_time: i64,
        auto_reveal: bool,
    },
    TimerEnded,
    Error {
        message: String,
    },
    /// The room was removed while the receiver was still attached
    RoomClosed {
        reason: String,
    },
    Pong,
    ServerShutdown,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planpoker_core::ScaleKind;

    #[test]
    fn test_client_tags_are_snake_case() {
        let msg = ClientMessage::StartTimer {
            timer_duration: 60,
            auto_reveal: true,
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "start_timer");
        assert_eq!(json["timer_duration"], 60);
    }

    #[test]
    fn test_vote_defaults_to_clear() {
        let msg = ClientMessage::from_bytes(br#"{"type":"vote"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Vote {
                vote: String::new()
            }
        );
    }

    #[test]
    fn test_join_without_token() {
        let msg =
            ClientMessage::from_bytes(br#"{"type":"join","room_code":"abc123","name":"ann"}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::Join { host_token: None, .. }));
    }

    #[test]
    fn test_unknown_type_reported() {
        let err = ClientMessage::from_bytes(br#"{"type":"dance"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Protocol error: unknown message type: dance");
    }

    #[test]
    fn test_bad_shape_is_malformed() {
        let err = ClientMessage::from_bytes(br#"{"type":"get_room"}"#).unwrap_err();
        assert!(err.to_string().contains("malformed message"));

        let err = ClientMessage::from_bytes(b"[1,2]").unwrap_err();
        assert!(err.to_string().contains("malformed message"));
    }

    #[test]
    fn test_sync_flattens_view() {
        let view = RoomView {
            code: "ABC123".to_string(),
            participants: Vec::new(),
            revealed: false,
            current_participant_id: Uuid::new_v4(),
            host_id: None,
            scale: VotingScale::preset(ScaleKind::Powers2),
            timer_end_time: None,
            timer_auto_reveal: false,
        };
        let msg = ServerMessage::Sync(view.clone());
        let bytes = msg.to_bytes().unwrap();

        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "sync");
        assert_eq!(json["code"], "ABC123");
        assert_eq!(json["scale"]["type"], "powers2");

        assert_eq!(ServerMessage::from_bytes(&bytes).unwrap(), ServerMessage::Sync(view));
    }
}
