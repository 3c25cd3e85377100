//! Time-boxed cache in front of the leaderboard query.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::dao::models::LeaderboardEntryEntity;

/// How long a computed board is served before the store is queried again.
pub const DEFAULT_LEADERBOARD_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedBoard {
    fetched_at: Instant,
    entries: Vec<LeaderboardEntryEntity>,
}

/// Short-lived leaderboard cache keyed by the requested limit.
#[derive(Debug)]
pub struct LeaderboardCache {
    ttl: Duration,
    boards: DashMap<u32, CachedBoard>,
}

impl Default for LeaderboardCache {
    fn default() -> Self {
        Self::new(DEFAULT_LEADERBOARD_TTL)
    }
}

impl LeaderboardCache {
    /// Build a cache with a custom TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            boards: DashMap::new(),
        }
    }

    /// Cached board for `limit` when it is fresh and non-empty.
    pub fn get(&self, limit: u32, now: Instant) -> Option<Vec<LeaderboardEntryEntity>> {
        let board = self.boards.get(&limit)?;
        if board.entries.is_empty() || now.saturating_duration_since(board.fetched_at) >= self.ttl
        {
            return None;
        }
        Some(board.entries.clone())
    }

    /// Store a freshly computed board.
    pub fn put(&self, limit: u32, entries: Vec<LeaderboardEntryEntity>, now: Instant) {
        self.boards.insert(
            limit,
            CachedBoard {
                fetched_at: now,
                entries,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, score: u64) -> LeaderboardEntryEntity {
        LeaderboardEntryEntity {
            name: name.into(),
            score,
        }
    }

    #[test]
    fn fresh_board_is_served() {
        let cache = LeaderboardCache::default();
        let now = Instant::now();
        cache.put(10, vec![entry("Ada", 100)], now);
        let hit = cache.get(10, now + Duration::from_secs(4)).unwrap();
        assert_eq!(hit, vec![entry("Ada", 100)]);
    }

    #[test]
    fn expired_board_misses() {
        let cache = LeaderboardCache::default();
        let now = Instant::now();
        cache.put(10, vec![entry("Ada", 100)], now);
        assert!(cache.get(10, now + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn boards_are_keyed_by_limit() {
        let cache = LeaderboardCache::default();
        let now = Instant::now();
        cache.put(10, vec![entry("Ada", 100)], now);
        assert!(cache.get(5, now).is_none());
    }

    #[test]
    fn empty_board_is_not_a_hit() {
        let cache = LeaderboardCache::default();
        let now = Instant::now();
        cache.put(10, Vec::new(), now);
        assert!(cache.get(10, now).is_none());
    }
}
