//! Room snapshot storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::{
    parse_datetime, parse_datetime_opt, parse_scale, parse_uuid, parse_uuid_opt, OptionalExt,
};
use crate::error::Result;
use crate::models::{ParticipantSnapshot, RoomSnapshot};

pub struct RoomStore<'a> {
    conn: &'a Connection,
}

const ROOM_COLUMNS: &str = "code, host_id, host_token, created_at, last_active_at, expiry_hours,
     scale_json, timer_end_time, timer_auto_reveal, revealed";

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<RoomSnapshot> {
    Ok(RoomSnapshot {
        code: row.get(0)?,
        host_id: parse_uuid_opt(row.get::<_, Option<String>>(1)?)?,
        host_token: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?)?,
        last_active_at: parse_datetime(&row.get::<_, String>(4)?)?,
        expiry_hours: row.get(5)?,
        scale: parse_scale(&row.get::<_, String>(6)?)?,
        timer_end_time: parse_datetime_opt(row.get::<_, Option<String>>(7)?)?,
        timer_auto_reveal: row.get(8)?,
        revealed: row.get(9)?,
        participants: Vec::new(),
    })
}

impl<'a> RoomStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a room, rewriting its participant rows
    #[instrument(skip(self, snapshot), fields(room = %snapshot.code))]
    pub fn save(&self, snapshot: &RoomSnapshot) -> Result<()> {
        let scale_json = serde_json::to_string(&snapshot.scale)?;
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO rooms (code, host_id, host_token, created_at, last_active_at, expiry_hours,
                                scale_json, timer_end_time, timer_auto_reveal, revealed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(code) DO UPDATE SET
                host_id = excluded.host_id,
                host_token = excluded.host_token,
                last_active_at = excluded.last_active_at,
                expiry_hours = excluded.expiry_hours,
                scale_json = excluded.scale_json,
                timer_end_time = excluded.timer_end_time,
                timer_auto_reveal = excluded.timer_auto_reveal,
                revealed = excluded.revealed",
            params![
                snapshot.code,
                snapshot.host_id.map(|h| h.to_string()),
                snapshot.host_token,
                snapshot.created_at.to_rfc3339(),
                snapshot.last_active_at.to_rfc3339(),
                snapshot.expiry_hours,
                scale_json,
                snapshot.timer_end_time.map(|t| t.to_rfc3339()),
                snapshot.timer_auto_reveal,
                snapshot.revealed,
            ],
        )?;

        // Small rooms: replacing every row is simpler than diffing
        tx.execute(
            "DELETE FROM participants WHERE room_code = ?1",
            params![snapshot.code],
        )?;

        for (seat, p) in snapshot.participants.iter().enumerate() {
            tx.execute(
                "INSERT INTO participants (id, room_code, seat, name, avatar, vote, is_host)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    p.id.to_string(),
                    snapshot.code,
                    seat as i64,
                    p.name,
                    p.avatar,
                    p.vote,
                    p.is_host,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Find a room by code, with its participants in seat order
    #[instrument(skip(self))]
    pub fn find(&self, code: &str) -> Result<Option<RoomSnapshot>> {
        let room = self
            .conn
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE code = ?1"),
                params![code],
                room_from_row,
            )
            .optional()?;

        let Some(mut room) = room else {
            return Ok(None);
        };
        room.participants = self.participants(code)?;
        Ok(Some(room))
    }

    /// List every stored room
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<RoomSnapshot>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ROOM_COLUMNS} FROM rooms ORDER BY created_at"))?;

        let mut rooms = stmt
            .query_map([], room_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for room in &mut rooms {
            room.participants = self.participants(&room.code)?;
        }
        Ok(rooms)
    }

    /// Delete a room (participants cascade)
    #[instrument(skip(self))]
    pub fn delete(&self, code: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM rooms WHERE code = ?1", params![code])?;
        Ok(())
    }

    fn participants(&self, code: &str) -> Result<Vec<ParticipantSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, avatar, vote, is_host FROM participants
             WHERE room_code = ?1 ORDER BY seat",
        )?;

        let participants = stmt
            .query_map(params![code], |row| {
                Ok(ParticipantSnapshot {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    name: row.get(1)?,
                    avatar: row.get(2)?,
                    vote: row.get(3)?,
                    is_host: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(participants)
    }
}
