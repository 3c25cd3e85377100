//! Per-account minimum interval between non-forced progress saves.

use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};
use uuid::Uuid;

/// Minimum spacing between two non-forced saves of the same account.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_millis(2_000);
/// Map size above which entries older than the interval are pruned.
const PRUNE_THRESHOLD: usize = 1_024;

/// Per-account gate that absorbs bursts of non-forced progress saves.
#[derive(Debug)]
pub struct SaveThrottle {
    interval: Duration,
    last_accepted: DashMap<Uuid, Instant>,
}

impl Default for SaveThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_SAVE_INTERVAL)
    }
}

impl SaveThrottle {
    /// Build a throttle with a custom interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: DashMap::new(),
        }
    }

    /// Decide whether a save for `account_id` should hit the store.
    ///
    /// Forced saves are always admitted. An admitted save records `now` as the
    /// account's last accepted save, whatever the outcome of the write.
    pub fn admit(&self, account_id: Uuid, force: bool, now: Instant) -> bool {
        let admitted = match self.last_accepted.entry(account_id) {
            Entry::Occupied(mut entry) => {
                if !force && now.saturating_duration_since(*entry.get()) < self.interval {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        };

        if admitted && self.last_accepted.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        admitted
    }

    /// Forget accounts whose last save is older than the interval.
    pub fn prune(&self, now: Instant) {
        self.last_accepted
            .retain(|_, last| now.saturating_duration_since(*last) < self.interval);
    }

    /// Number of tracked accounts.
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    /// True when no account is tracked.
    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_save_within_interval_is_skipped() {
        let throttle = SaveThrottle::default();
        let id = Uuid::new_v4();
        let start = Instant::now();

        assert!(throttle.admit(id, false, start));
        assert!(!throttle.admit(id, false, start + Duration::from_millis(500)));
        assert!(throttle.admit(id, false, start + Duration::from_millis(2_000)));
    }

    #[test]
    fn forced_save_always_passes() {
        let throttle = SaveThrottle::default();
        let id = Uuid::new_v4();
        let start = Instant::now();

        assert!(throttle.admit(id, false, start));
        assert!(throttle.admit(id, true, start + Duration::from_millis(10)));
        // The forced save resets the window.
        assert!(!throttle.admit(id, false, start + Duration::from_millis(1_500)));
    }

    #[test]
    fn accounts_are_throttled_independently() {
        let throttle = SaveThrottle::default();
        let start = Instant::now();
        assert!(throttle.admit(Uuid::new_v4(), false, start));
        assert!(throttle.admit(Uuid::new_v4(), false, start));
    }

    #[test]
    fn prune_drops_stale_entries() {
        let throttle = SaveThrottle::new(Duration::from_millis(100));
        let start = Instant::now();
        throttle.admit(Uuid::new_v4(), false, start);
        throttle.prune(start + Duration::from_millis(200));
        assert!(throttle.is_empty());
    }
}
