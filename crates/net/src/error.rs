//! Network error types

use std::io;

use planpoker_core::RoomError;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Room limit reached")]
    RegistryFull,

    #[error("room not found")]
    RoomNotFound,

    #[error(transparent)]
    Room(#[from] RoomError),
}
