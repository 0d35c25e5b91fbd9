//! Avatar allocation
//!
//! Avatars come from a small fixed catalogue. Once every entry is taken the
//! pool hands out overflow avatars (`<entry>-<n>`) from a counter, so the
//! sequence of assignments is reproducible.

use std::collections::HashSet;

/// The fixed avatar catalogue, in assignment order
pub const AVATARS: &[&str] = &[
    "sheriff",
    "outlaw",
    "cowgirl",
    "prospector",
    "banker",
    "deputy",
    "saloon-owner",
    "bounty-hunter",
];

#[derive(Debug, Default, Clone)]
pub struct AvatarPool {
    in_use: HashSet<String>,
    overflow_seq: usize,
}

impl AvatarPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the first free catalogue avatar, or an overflow avatar when the
    /// catalogue is exhausted
    pub fn assign(&mut self) -> String {
        if let Some(avatar) = AVATARS.iter().find(|a| !self.in_use.contains(**a)) {
            self.in_use.insert(avatar.to_string());
            return avatar.to_string();
        }

        // Catalogue exhausted
        loop {
            let n = self.overflow_seq;
            self.overflow_seq += 1;
            let avatar = format!("{}-{}", AVATARS[n % AVATARS.len()], n / AVATARS.len() + 2);
            if self.in_use.insert(avatar.clone()) {
                return avatar;
            }
        }
    }

    pub fn release(&mut self, avatar: &str) {
        self.in_use.remove(avatar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_avatars_are_distinct() {
        let mut pool = AvatarPool::new();
        let assigned: HashSet<String> = (0..AVATARS.len()).map(|_| pool.assign()).collect();
        assert_eq!(assigned.len(), AVATARS.len());
        for avatar in AVATARS {
            assert!(assigned.contains(*avatar));
        }
    }

    #[test]
    fn test_released_avatar_is_reused_first() {
        let mut pool = AvatarPool::new();
        let first = pool.assign();
        let _second = pool.assign();
        pool.release(&first);
        assert_eq!(pool.assign(), first);
    }

    #[test]
    fn test_overflow_is_deterministic() {
        let mut a = AvatarPool::new();
        let mut b = AvatarPool::new();
        let seq_a: Vec<String> = (0..AVATARS.len() + 3).map(|_| a.assign()).collect();
        let seq_b: Vec<String> = (0..AVATARS.len() + 3).map(|_| b.assign()).collect();
        assert_eq!(seq_a, seq_b);
        assert_eq!(seq_a[AVATARS.len()], "sheriff-2");
        assert_eq!(seq_a[AVATARS.len() + 1], "outlaw-2");
    }

    #[test]
    fn test_overflow_avatars_stay_distinct() {
        let mut pool = AvatarPool::new();
        let all: Vec<String> = (0..AVATARS.len() * 3).map(|_| pool.assign()).collect();
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }
}
