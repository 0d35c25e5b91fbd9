//! Storage repository traits
//!
//! The hub persists rooms through this interface so the SQLite backend can
//! be swapped out (or omitted) without touching room logic.

use crate::error::Result;
use crate::models::RoomSnapshot;

/// Room snapshot persistence
pub trait RoomRepository: Send + Sync {
    /// Insert or replace a room and its participants
    fn save_room(&self, snapshot: &RoomSnapshot) -> Result<()>;

    /// Find a room by code
    fn find_room(&self, code: &str) -> Result<Option<RoomSnapshot>>;

    /// Load all persisted rooms
    fn list_rooms(&self) -> Result<Vec<RoomSnapshot>>;

    /// Delete a room and its participants
    fn delete_room(&self, code: &str) -> Result<()>;
}
