//! SQLite storage layer for planpoker room snapshots

mod migrations;
mod parse;
mod rooms;
mod traits;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::models::RoomSnapshot;

pub use rooms::RoomStore;
pub use traits::RoomRepository;

/// Main database handle
///
/// The connection sits behind a mutex so one handle can be shared by the hub's
/// background persistence tasks.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Initialize database schema via migrations
    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::InvalidOperation("database connection poisoned".into()))
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn()
            .ok()
            .and_then(|conn| {
                conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                    row.get(0)
                })
                .ok()
            })
            .unwrap_or(0)
    }
}

impl RoomRepository for Database {
    fn save_room(&self, snapshot: &RoomSnapshot) -> Result<()> {
        let conn = self.conn()?;
        RoomStore::new(&conn).save(snapshot)
    }

    fn find_room(&self, code: &str) -> Result<Option<RoomSnapshot>> {
        let conn = self.conn()?;
        RoomStore::new(&conn).find(code)
    }

    fn list_rooms(&self) -> Result<Vec<RoomSnapshot>> {
        let conn = self.conn()?;
        RoomStore::new(&conn).list()
    }

    fn delete_room(&self, code: &str) -> Result<()> {
        let conn = self.conn()?;
        RoomStore::new(&conn).delete(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScaleKind, VotingScale};
    use crate::room::{RoomState, MAX_PARTICIPANTS};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sample_room() -> (RoomState, Uuid, Uuid) {
        let mut room = RoomState::new(
            "SAVE01".to_string(),
            "secret".to_string(),
            12,
            VotingScale::preset(ScaleKind::Tshirt),
            MAX_PARTICIPANTS,
        );
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        room.add_participant(alice, "alice", false).unwrap();
        room.add_participant(bob, "bob", false).unwrap();
        room.vote(bob, "XL").unwrap();
        room.start_timer(alice, 60, true).unwrap();
        (room, alice, bob)
    }

    #[test]
    fn test_save_and_find() {
        let db = Database::open_in_memory().unwrap();
        let (room, alice, bob) = sample_room();
        let snapshot = room.to_snapshot();

        db.save_room(&snapshot).unwrap();
        let loaded = db.find_room("SAVE01").unwrap().unwrap();

        assert_eq!(loaded.host_id, Some(alice));
        assert_eq!(loaded.host_token, "secret");
        assert_eq!(loaded.scale.kind, ScaleKind::Tshirt);
        assert!(loaded.timer_auto_reveal);
        assert_eq!(loaded.timer_end_time, snapshot.timer_end_time);
        assert_eq!(loaded.participants.len(), 2);
        assert_eq!(loaded.participants[0].id, alice);
        assert!(loaded.participants[0].is_host);
        assert_eq!(loaded.participants[1].id, bob);
        assert_eq!(loaded.participants[1].vote.as_deref(), Some("XL"));
    }

    #[test]
    fn test_save_replaces_participants() {
        let db = Database::open_in_memory().unwrap();
        let (mut room, _alice, bob) = sample_room();
        db.save_room(&room.to_snapshot()).unwrap();

        room.remove_participant(bob);
        room.reset();
        db.save_room(&room.to_snapshot()).unwrap();

        let loaded = db.find_room("SAVE01").unwrap().unwrap();
        assert_eq!(loaded.participants.len(), 1);
        assert!(!loaded.revealed);
    }

    #[test]
    fn test_delete_cascades() {
        let db = Database::open_in_memory().unwrap();
        let (room, _, _) = sample_room();
        db.save_room(&room.to_snapshot()).unwrap();

        db.delete_room("SAVE01").unwrap();
        assert!(db.find_room("SAVE01").unwrap().is_none());
        assert!(db.list_rooms().unwrap().is_empty());

        // Deleting again is a no-op
        db.delete_room("SAVE01").unwrap();
    }

    #[test]
    fn test_custom_scale_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data").join("planpoker.db");

        let values = vec!["S".to_string(), "M".to_string(), "coffee".to_string()];
        let room = RoomState::new(
            "DISK01".to_string(),
            "tok".to_string(),
            1,
            VotingScale::custom(&values).unwrap(),
            MAX_PARTICIPANTS,
        );

        {
            let db = Database::open(&path).unwrap();
            db.save_room(&room.to_snapshot()).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert!(db.schema_version() >= 1);
        let rooms = db.list_rooms().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].scale.values, values);
        assert!(rooms[0].participants.is_empty());
    }
}
