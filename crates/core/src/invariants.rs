//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::room::RoomState;

/// Validate that a room's host bookkeeping is internally consistent
pub fn assert_room_invariants(room: &RoomState) {
    let host_count = room.participants().filter(|p| p.is_host).count();

    if room.is_empty() {
        debug_assert!(
            room.host_id().is_none(),
            "Room {} is empty but has host {:?}",
            room.code(),
            room.host_id()
        );
        return;
    }

    debug_assert!(
        host_count == 1,
        "Room {} has {} hosts, expected exactly 1",
        room.code(),
        host_count
    );

    debug_assert!(
        room.host_id()
            .and_then(|id| room.participant(id))
            .is_some_and(|p| p.is_host),
        "Room {} host {:?} is not a flagged participant",
        room.code(),
        room.host_id()
    );
}

/// Validate that a room code is well-formed
pub fn assert_room_code_valid(code: &str) {
    debug_assert!(
        !code.is_empty() && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
        "Malformed room code: {:?}",
        code
    );
}
