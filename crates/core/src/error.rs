//! Error types for planpoker core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejections returned by room operations.
///
/// None of these change room state. The message text is what the acting
/// participant sees in the error frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("only the host can {0}")]
    NotHost(&'static str),

    #[error("room is full")]
    RoomFull,

    #[error("unknown participant")]
    UnknownParticipant,

    #[error("vote {0:?} is not on this room's scale")]
    InvalidVote(String),

    #[error("invalid timer duration {0} (1-300 seconds)")]
    InvalidTimerDuration(u64),

    #[error("name must not be empty")]
    InvalidName,

    #[error("room is closed")]
    Closed,
}
