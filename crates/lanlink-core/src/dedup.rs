//! Duplicate suppression for best-effort datagrams.
//!
//! Best-effort payloads may be sent several times to survive loss. The
//! receiver remembers the digests of recent payloads for a short expiry
//! window and drops any repeat it still remembers. Copies of one send leave
//! back to back, so the window only has to span a burst; identical content
//! sent again later (a periodic ENUM, an unchanged position) is delivered.
//! A capacity cap bounds memory when many distinct payloads arrive at once.

use crate::PeerId;
use crate::action::Action;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Default number of remembered keys
pub const DEFAULT_CAPACITY: usize = 256;

/// Default lifetime of a remembered key
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(1);

/// Digest key of a best-effort payload from a given peer
#[must_use]
pub fn payload_key(peer_id: PeerId, action: Action, data: &[u8]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&peer_id.to_le_bytes());
    hasher.update(&[action.as_u8()]);
    hasher.update(data);
    let digest = hasher.finalize();
    let mut key = [0u8; 8];
    key.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(key)
}

/// Recent-key set with time expiry and FIFO eviction at capacity
#[derive(Debug)]
pub struct DuplicateFilter {
    capacity: usize,
    expiry: Duration,
    order: VecDeque<(u64, Instant)>,
    seen: HashSet<u64>,
}

impl DuplicateFilter {
    /// Create a filter remembering at most `capacity` keys for `expiry` each
    #[must_use]
    pub fn new(capacity: usize, expiry: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            expiry,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Record `key` seen at `now`. Returns true unless the key was recorded
    /// within the expiry window.
    pub fn check_and_insert(&mut self, key: u64, now: Instant) -> bool {
        self.expire(now);
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            self.evict_oldest();
        }
        self.order.push_back((key, now));
        self.seen.insert(key);
        true
    }

    /// Forget every key older than the expiry window
    pub fn expire(&mut self, now: Instant) {
        while let Some(&(_, at)) = self.order.front() {
            if now.saturating_duration_since(at) < self.expiry {
                break;
            }
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((oldest, _)) = self.order.pop_front() {
            self.seen.remove(&oldest);
        }
    }

    /// Number of remembered keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no key is remembered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_EXPIRY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_only() {
        let mut filter = DuplicateFilter::default();
        let now = Instant::now();
        assert!(filter.check_and_insert(1, now));
        assert!(!filter.check_and_insert(1, now));
        assert!(filter.check_and_insert(2, now));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_oldest_evicted() {
        let mut filter = DuplicateFilter::new(3, DEFAULT_EXPIRY);
        let now = Instant::now();
        for key in 0..3 {
            assert!(filter.check_and_insert(key, now));
        }
        assert!(filter.check_and_insert(3, now));
        assert_eq!(filter.len(), 3);
        // 0 fell out of the window
        assert!(filter.check_and_insert(0, now));
        assert!(!filter.check_and_insert(3, now));
    }

    #[test]
    fn test_keys_expire() {
        let mut filter = DuplicateFilter::new(DEFAULT_CAPACITY, Duration::from_millis(500));
        let start = Instant::now();
        assert!(filter.check_and_insert(7, start));
        assert!(filter.check_and_insert(8, start + Duration::from_millis(300)));

        assert!(!filter.check_and_insert(7, start + Duration::from_millis(499)));
        assert!(filter.check_and_insert(7, start + Duration::from_millis(500)));
        // 8 is younger and still remembered
        assert!(!filter.check_and_insert(8, start + Duration::from_millis(700)));
        assert_eq!(filter.len(), 2);

        filter.expire(start + Duration::from_secs(30));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_payload_key_distinguishes_inputs() {
        let base = payload_key(1, Action::UdpData, b"abc");
        assert_eq!(base, payload_key(1, Action::UdpData, b"abc"));
        assert_ne!(base, payload_key(2, Action::UdpData, b"abc"));
        assert_ne!(base, payload_key(1, Action::Enum, b"abc"));
        assert_ne!(base, payload_key(1, Action::UdpData, b"abd"));
    }
}
