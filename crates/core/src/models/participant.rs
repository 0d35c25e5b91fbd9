//! Participant model - one person seated in a room

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum characters kept from a display name
pub const MAX_NAME_LEN: usize = 32;

/// A participant's state inside a room.
///
/// Only mutated by the owning room while its lock is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    pub vote: Option<String>,
    pub is_host: bool,
    /// Join order within the room, used for deterministic host promotion
    pub(crate) seat: u64,
}

impl Participant {
    pub fn has_voted(&self) -> bool {
        self.vote.is_some()
    }

    /// Set or clear (empty token) the vote
    pub fn set_vote(&mut self, token: &str) {
        if token.is_empty() {
            self.vote = None;
        } else {
            self.vote = Some(token.to_string());
        }
    }

    pub fn reset_vote(&mut self) {
        self.vote = None;
    }

    /// Wire view; the vote is only included when `include_vote` is set
    pub fn to_view(&self, include_vote: bool) -> ParticipantView {
        ParticipantView {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            has_voted: self.has_voted(),
            vote: if include_vote { self.vote.clone() } else { None },
            is_host: self.is_host,
        }
    }
}

/// Participant as seen by other participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    pub has_voted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<String>,
    pub is_host: bool,
}

/// Normalize a user-supplied display name.
///
/// Trims whitespace and truncates to [`MAX_NAME_LEN`] characters. Returns
/// `None` if nothing is left.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant() -> Participant {
        Participant {
            id: Uuid::new_v4(),
            name: "alice".to_string(),
            avatar: "sheriff".to_string(),
            vote: None,
            is_host: false,
            seat: 0,
        }
    }

    #[test]
    fn test_set_and_clear_vote() {
        let mut p = participant();
        p.set_vote("5");
        assert!(p.has_voted());
        assert_eq!(p.vote.as_deref(), Some("5"));

        p.set_vote("");
        assert!(!p.has_voted());
        assert_eq!(p.vote, None);
    }

    #[test]
    fn test_view_hides_vote() {
        let mut p = participant();
        p.set_vote("8");

        let hidden = p.to_view(false);
        assert!(hidden.has_voted);
        assert_eq!(hidden.vote, None);

        let shown = p.to_view(true);
        assert_eq!(shown.vote.as_deref(), Some("8"));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  bob  ").as_deref(), Some("bob"));
        assert_eq!(normalize_name("   "), None);

        let long = "é".repeat(MAX_NAME_LEN + 10);
        assert_eq!(normalize_name(&long).unwrap().chars().count(), MAX_NAME_LEN);
    }
}
