//! Room state machine
//!
//! `RoomState` is the authoritative, lock-free state of one estimation
//! session. It performs no I/O and knows nothing about connections; the
//! networking layer wraps it in a mutex and turns successful transitions
//! into broadcasts.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::avatars::AvatarPool;
use crate::error::RoomError;
use crate::invariants::assert_room_invariants;
use crate::models::{
    normalize_name, Participant, ParticipantSnapshot, RoomSnapshot, RoomView, VoteResults,
    VotingScale,
};

/// Default participant ceiling per room
pub const MAX_PARTICIPANTS: usize = 30;

/// Shortest accepted round timer, in seconds
pub const MIN_TIMER_SECS: u64 = 1;

/// Longest accepted round timer, in seconds
pub const MAX_TIMER_SECS: u64 = 300;

/// An armed round timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    pub deadline: DateTime<Utc>,
    pub auto_reveal: bool,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    code: String,
    host_token: String,
    participants: HashMap<Uuid, Participant>,
    host_id: Option<Uuid>,
    revealed: bool,
    scale: VotingScale,
    timer: Option<TimerSpec>,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
    expiry_hours: u32,
    avatars: AvatarPool,
    next_seat: u64,
    max_participants: usize,
}

impl RoomState {
    pub fn new(
        code: String,
        host_token: String,
        expiry_hours: u32,
        scale: VotingScale,
        max_participants: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            code,
            host_token,
            participants: HashMap::new(),
            host_id: None,
            revealed: false,
            scale,
            timer: None,
            created_at: now,
            last_active_at: now,
            expiry_hours,
            avatars: AvatarPool::new(),
            next_seat: 0,
            max_participants,
        }
    }

    /// Rebuild a room from a persisted snapshot.
    ///
    /// Participants are not re-seated: they had live connections that no
    /// longer exist and will come back as new joins. Any timer is dropped
    /// since its countdown task died with the process.
    pub fn restore(snapshot: &RoomSnapshot, max_participants: usize) -> Self {
        Self {
            code: snapshot.code.clone(),
            host_token: snapshot.host_token.clone(),
            participants: HashMap::new(),
            host_id: None,
            revealed: snapshot.revealed,
            scale: snapshot.scale.clone(),
            timer: None,
            created_at: snapshot.created_at,
            last_active_at: snapshot.last_active_at,
            expiry_hours: snapshot.expiry_hours,
            avatars: AvatarPool::new(),
            next_seat: 0,
            max_participants,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn host_id(&self) -> Option<Uuid> {
        self.host_id
    }

    pub fn is_host(&self, id: Uuid) -> bool {
        self.host_id == Some(id)
    }

    pub fn revealed(&self) -> bool {
        self.revealed
    }

    pub fn scale(&self) -> &VotingScale {
        &self.scale
    }

    pub fn timer(&self) -> Option<TimerSpec> {
        self.timer
    }

    pub fn expiry_hours(&self) -> u32 {
        self.expiry_hours
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn participant(&self, id: Uuid) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Check a capability token against the room's host token
    pub fn token_matches(&self, token: &str) -> bool {
        !token.is_empty() && token == self.host_token
    }

    /// True once `expiry_hours` have passed since the last activity
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_active_at > Duration::hours(i64::from(self.expiry_hours))
    }

    fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    fn require_host(&self, requester: Uuid, action: &'static str) -> Result<(), RoomError> {
        if self.is_host(requester) {
            Ok(())
        } else {
            Err(RoomError::NotHost(action))
        }
    }

    /// Seat a new participant.
    ///
    /// The first participant becomes host. `claim_host` (the joiner presented
    /// the room's capability token) moves host rights to the joiner.
    pub fn add_participant(
        &mut self,
        id: Uuid,
        name: &str,
        claim_host: bool,
    ) -> Result<Participant, RoomError> {
        if self.participants.len() >= self.max_participants {
            return Err(RoomError::RoomFull);
        }
        let name = normalize_name(name).ok_or(RoomError::InvalidName)?;

        let become_host = self.participants.is_empty() || claim_host;
        if become_host {
            if let Some(previous) = self.host_id.and_then(|h| self.participants.get_mut(&h)) {
                previous.is_host = false;
            }
            self.host_id = Some(id);
        }

        let participant = Participant {
            id,
            name,
            avatar: self.avatars.assign(),
            vote: None,
            is_host: become_host,
            seat: self.next_seat,
        };
        self.next_seat += 1;
        self.participants.insert(id, participant.clone());
        self.touch();

        assert_room_invariants(self);
        Ok(participant)
    }

    /// Remove a participant, promoting the earliest-seated remaining
    /// participant if the host left
    pub fn remove_participant(&mut self, id: Uuid) -> Option<Participant> {
        let removed = self.participants.remove(&id);

        if let Some(participant) = &removed {
            self.avatars.release(&participant.avatar);

            if self.host_id == Some(id) {
                self.host_id = None;
                if let Some(next) = self.participants.values_mut().min_by_key(|p| p.seat) {
                    next.is_host = true;
                    self.host_id = Some(next.id);
                }
            }
            self.touch();
        }

        assert_room_invariants(self);
        removed
    }

    /// Set or clear (empty token) a participant's vote.
    ///
    /// Accepted whether or not the round is revealed.
    pub fn vote(&mut self, id: Uuid, token: &str) -> Result<(), RoomError> {
        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(RoomError::UnknownParticipant)?;
        if !token.is_empty() && !self.scale.contains(token) {
            return Err(RoomError::InvalidVote(token.to_string()));
        }
        participant.set_vote(token);
        self.touch();
        Ok(())
    }

    /// Reveal the round. Host only.
    pub fn reveal(&mut self, requester: Uuid) -> Result<(), RoomError> {
        self.require_host(requester, "reveal votes")?;
        self.revealed = true;
        self.touch();
        Ok(())
    }

    /// Reveal without an authorization check (timer auto-reveal).
    /// Returns false if the round was already revealed.
    pub fn auto_reveal(&mut self) -> bool {
        if self.revealed {
            return false;
        }
        self.revealed = true;
        self.touch();
        true
    }

    /// Start a new round: hide and clear every vote.
    ///
    /// Unconditional; callers that expose this to participants check host
    /// rights first.
    pub fn reset(&mut self) {
        self.revealed = false;
        for participant in self.participants.values_mut() {
            participant.reset_vote();
        }
        self.touch();
    }

    /// Arm the round timer, replacing any running one. Host only.
    pub fn start_timer(
        &mut self,
        requester: Uuid,
        duration_secs: u64,
        auto_reveal: bool,
    ) -> Result<TimerSpec, RoomError> {
        if !(MIN_TIMER_SECS..=MAX_TIMER_SECS).contains(&duration_secs) {
            return Err(RoomError::InvalidTimerDuration(duration_secs));
        }
        self.require_host(requester, "start the timer")?;

        let spec = TimerSpec {
            // Bounded by MAX_TIMER_SECS, the cast cannot truncate
            deadline: Utc::now() + Duration::seconds(duration_secs as i64),
            auto_reveal,
        };
        self.timer = Some(spec);
        self.touch();
        Ok(spec)
    }

    /// Disarm the round timer. Host only.
    pub fn stop_timer(&mut self, requester: Uuid) -> Result<(), RoomError> {
        self.require_host(requester, "stop the timer")?;
        self.timer = None;
        self.touch();
        Ok(())
    }

    /// Drop timer state after the countdown expired
    pub fn clear_timer(&mut self) -> Option<TimerSpec> {
        self.timer.take()
    }

    /// Tally the current votes
    pub fn compute_results(&self) -> VoteResults {
        let mut votes = HashMap::new();
        let mut sum = 0.0;
        let mut count = 0u32;

        for participant in self.participants.values() {
            if let Some(vote) = &participant.vote {
                votes.insert(participant.id, vote.clone());
                if let Ok(value) = vote.parse::<f64>() {
                    if value.is_finite() {
                        sum += value;
                        count += 1;
                    }
                }
            }
        }

        let average = if count > 0 { sum / f64::from(count) } else { 0.0 };

        VoteResults {
            votes,
            average,
            revealed: self.revealed,
        }
    }

    /// Full state for one viewer.
    ///
    /// Before reveal only the viewer's own vote is included.
    pub fn snapshot_for(&self, viewer: Uuid) -> RoomView {
        let mut participants: Vec<_> = self.participants.values().collect();
        participants.sort_by_key(|p| p.seat);

        RoomView {
            code: self.code.clone(),
            participants: participants
                .into_iter()
                .map(|p| p.to_view(self.revealed || p.id == viewer))
                .collect(),
            revealed: self.revealed,
            current_participant_id: viewer,
            host_id: self.host_id,
            scale: self.scale.clone(),
            timer_end_time: self
                .timer
                .filter(|t| t.deadline > Utc::now())
                .map(|t| t.deadline.timestamp_millis()),
            timer_auto_reveal: self.timer.map(|t| t.auto_reveal).unwrap_or(false),
        }
    }

    /// Persistable copy of the room
    pub fn to_snapshot(&self) -> RoomSnapshot {
        let mut participants: Vec<_> = self.participants.values().collect();
        participants.sort_by_key(|p| p.seat);

        RoomSnapshot {
            code: self.code.clone(),
            host_id: self.host_id,
            host_token: self.host_token.clone(),
            created_at: self.created_at,
            last_active_at: self.last_active_at,
            expiry_hours: self.expiry_hours,
            scale: self.scale.clone(),
            timer_end_time: self.timer.map(|t| t.deadline),
            timer_auto_reveal: self.timer.map(|t| t.auto_reveal).unwrap_or(false),
            revealed: self.revealed,
            participants: participants
                .into_iter()
                .map(|p| ParticipantSnapshot {
                    id: p.id,
                    name: p.name.clone(),
                    avatar: p.avatar.clone(),
                    vote: p.vote.clone(),
                    is_host: p.is_host,
                })
                .collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_last_active_at(&mut self, at: DateTime<Utc>) {
        self.last_active_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatars::AVATARS;
    use crate::models::ScaleKind;

    fn room() -> RoomState {
        RoomState::new(
            "ABC123".to_string(),
            "token".to_string(),
            24,
            VotingScale::preset(ScaleKind::Fibonacci),
            MAX_PARTICIPANTS,
        )
    }

    fn join(room: &mut RoomState, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        room.add_participant(id, name, false).unwrap();
        id
    }

    fn host_count(room: &RoomState) -> usize {
        room.participants().filter(|p| p.is_host).count()
    }

    #[test]
    fn test_first_participant_is_host() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        let bob = join(&mut room, "bob");

        assert!(room.is_host(alice));
        assert!(!room.participant(bob).unwrap().is_host);
        assert_eq!(host_count(&room), 1);
    }

    #[test]
    fn test_host_uniqueness_across_churn() {
        let mut room = room();
        let mut seated = Vec::new();

        for round in 0..20 {
            seated.push(join(&mut room, &format!("p{round}")));
            if round % 3 == 2 {
                // Remove the host every third round, else the newest
                let victim = if round % 2 == 0 {
                    room.host_id().unwrap()
                } else {
                    *seated.last().unwrap()
                };
                room.remove_participant(victim);
                seated.retain(|id| *id != victim);
            }
            assert_eq!(host_count(&room), 1);
            assert!(room.participant(room.host_id().unwrap()).unwrap().is_host);
        }

        for id in seated.clone() {
            room.remove_participant(id);
            if room.is_empty() {
                assert_eq!(host_count(&room), 0);
                assert_eq!(room.host_id(), None);
            } else {
                assert_eq!(host_count(&room), 1);
            }
        }
    }

    #[test]
    fn test_host_promotion_picks_earliest_seat() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        let bob = join(&mut room, "bob");
        let _carol = join(&mut room, "carol");

        room.remove_participant(alice);
        assert_eq!(room.host_id(), Some(bob));
    }

    #[test]
    fn test_claim_host_with_token_demotes_previous() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        let bob = Uuid::new_v4();
        room.add_participant(bob, "bob", true).unwrap();

        assert_eq!(room.host_id(), Some(bob));
        assert!(!room.participant(alice).unwrap().is_host);
        assert_eq!(host_count(&room), 1);
    }

    #[test]
    fn test_room_capacity() {
        let mut room = RoomState::new(
            "CAP001".to_string(),
            "t".to_string(),
            1,
            VotingScale::default(),
            2,
        );
        join(&mut room, "a");
        join(&mut room, "b");
        assert_eq!(
            room.add_participant(Uuid::new_v4(), "c", false),
            Err(RoomError::RoomFull)
        );
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut room = room();
        assert_eq!(
            room.add_participant(Uuid::new_v4(), "  ", false),
            Err(RoomError::InvalidName)
        );
        assert!(room.is_empty());
    }

    #[test]
    fn test_avatars_distinct_up_to_catalogue() {
        let mut room = room();
        let mut avatars = std::collections::HashSet::new();
        for i in 0..AVATARS.len() {
            let id = join(&mut room, &format!("p{i}"));
            avatars.insert(room.participant(id).unwrap().avatar.clone());
        }
        assert_eq!(avatars.len(), AVATARS.len());
    }

    #[test]
    fn test_avatar_freed_on_leave() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        let avatar = room.participant(alice).unwrap().avatar.clone();
        room.remove_participant(alice);

        let bob = join(&mut room, "bob");
        assert_eq!(room.participant(bob).unwrap().avatar, avatar);
    }

    #[test]
    fn test_vote_unknown_participant() {
        let mut room = room();
        assert_eq!(
            room.vote(Uuid::new_v4(), "5"),
            Err(RoomError::UnknownParticipant)
        );
        assert_eq!(
            room.vote(Uuid::new_v4(), "4"),
            Err(RoomError::UnknownParticipant)
        );
    }

    #[test]
    fn test_vote_off_scale_rejected() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        assert_eq!(
            room.vote(alice, "4"),
            Err(RoomError::InvalidVote("4".to_string()))
        );
        assert!(!room.participant(alice).unwrap().has_voted());
    }

    #[test]
    fn test_vote_accepted_after_reveal() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        room.reveal(alice).unwrap();
        room.vote(alice, "13").unwrap();
        assert_eq!(room.participant(alice).unwrap().vote.as_deref(), Some("13"));
    }

    #[test]
    fn test_reveal_requires_host() {
        let mut room = room();
        let _alice = join(&mut room, "alice");
        let bob = join(&mut room, "bob");

        assert_eq!(room.reveal(bob), Err(RoomError::NotHost("reveal votes")));
        assert!(!room.revealed());
    }

    #[test]
    fn test_average_skips_non_numeric() {
        let mut room = room();
        for vote in ["3", "5", "?", "8"] {
            let id = join(&mut room, "voter");
            room.vote(id, vote).unwrap();
        }

        let results = room.compute_results();
        assert_eq!(results.votes.len(), 4);
        assert!((results.average - 16.0 / 3.0).abs() < 1e-9);
        assert!(!results.revealed);
    }

    #[test]
    fn test_average_zero_without_numeric_votes() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        room.vote(alice, "?").unwrap();
        assert_eq!(room.compute_results().average, 0.0);

        let empty = self::room();
        assert_eq!(empty.compute_results().average, 0.0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        let bob = join(&mut room, "bob");
        room.vote(alice, "5").unwrap();
        room.vote(bob, "8").unwrap();
        room.reveal(alice).unwrap();

        room.reset();
        let once = room.snapshot_for(alice);
        room.reset();
        let twice = room.snapshot_for(alice);

        assert_eq!(once, twice);
        assert!(!twice.revealed);
        assert!(twice.participants.iter().all(|p| !p.has_voted && p.vote.is_none()));
    }

    #[test]
    fn test_snapshot_redacts_other_votes() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        let bob = join(&mut room, "bob");
        room.vote(alice, "5").unwrap();
        room.vote(bob, "8").unwrap();

        let view = room.snapshot_for(alice);
        let own = view.participant(alice).unwrap();
        let other = view.participant(bob).unwrap();
        assert_eq!(own.vote.as_deref(), Some("5"));
        assert!(other.has_voted);
        assert_eq!(other.vote, None);

        room.reveal(alice).unwrap();
        let view = room.snapshot_for(alice);
        assert_eq!(view.participant(bob).unwrap().vote.as_deref(), Some("8"));
    }

    #[test]
    fn test_timer_requires_host_and_range() {
        let mut room = room();
        let alice = join(&mut room, "alice");
        let bob = join(&mut room, "bob");

        assert_eq!(
            room.start_timer(alice, 0, false),
            Err(RoomError::InvalidTimerDuration(0))
        );
        assert_eq!(
            room.start_timer(alice, 301, false),
            Err(RoomError::InvalidTimerDuration(301))
        );
        assert_eq!(
            room.start_timer(bob, 60, false),
            Err(RoomError::NotHost("start the timer"))
        );
        assert!(room.timer().is_none());

        let spec = room.start_timer(alice, 60, true).unwrap();
        assert!(spec.auto_reveal);
        assert_eq!(room.snapshot_for(bob).timer_end_time, Some(spec.deadline.timestamp_millis()));

        assert_eq!(room.stop_timer(bob), Err(RoomError::NotHost("stop the timer")));
        room.stop_timer(alice).unwrap();
        assert!(room.timer().is_none());
    }

    #[test]
    fn test_auto_reveal_only_once() {
        let mut room = room();
        assert!(room.auto_reveal());
        assert!(!room.auto_reveal());
    }

    #[test]
    fn test_removing_unknown_participant_keeps_activity() {
        let mut room = room();
        join(&mut room, "alice");
        let idle_since = Utc::now() - Duration::hours(2);
        room.set_last_active_at(idle_since);

        assert!(room.remove_participant(Uuid::new_v4()).is_none());
        assert_eq!(room.last_active_at(), idle_since);
    }

    #[test]
    fn test_expiry() {
        let mut room = room();
        assert!(!room.is_expired(Utc::now()));
        room.set_last_active_at(Utc::now() - Duration::hours(25));
        assert!(room.is_expired(Utc::now()));
    }

    #[test]
    fn test_restore_keeps_round_metadata() {
        let mut original = room();
        let alice = join(&mut original, "alice");
        original.reveal(alice).unwrap();
        let snapshot = original.to_snapshot();
        assert_eq!(snapshot.participants.len(), 1);
        assert_eq!(snapshot.host_id, Some(alice));

        let restored = RoomState::restore(&snapshot, MAX_PARTICIPANTS);
        assert_eq!(restored.code(), "ABC123");
        assert!(restored.revealed());
        assert!(restored.is_empty());
        assert!(restored.token_matches("token"));
        assert!(!restored.token_matches(""));
    }
}
