//! planpoker Core Library
//!
//! Models, the room state machine, avatar allocation, configuration, and
//! snapshot storage for planpoker.
//!
//! Nothing here spawns tasks or touches the network; `planpoker-net` wraps
//! [`RoomState`] in a lock and drives it from connections.

pub mod avatars;
pub mod config;
pub mod error;
pub mod invariants;
pub mod models;
pub mod room;
pub mod storage;

pub use avatars::{AvatarPool, AVATARS};
pub use config::{Config, DEFAULT_PORT};
pub use error::{Error, Result, RoomError};
pub use models::*;
pub use room::{RoomState, TimerSpec, MAX_PARTICIPANTS, MAX_TIMER_SECS, MIN_TIMER_SECS};
pub use storage::{Database, RoomRepository, RoomStore};
