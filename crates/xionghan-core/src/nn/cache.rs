//! Bounded cache of leaf evaluations keyed by Zobrist hash.
//!
//! Shared read-mostly across the alpha-beta workers. Overflow triggers a
//! whole-table reset rather than eviction: stale entries cannot linger and
//! memory stays bounded.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::Score;

const DEFAULT_CAPACITY: usize = 1 << 20;

pub struct ValueCache {
    map: RwLock<HashMap<u64, Score>>,
    capacity: usize,
}

impl ValueCache {
    pub fn new() -> ValueCache {
        ValueCache::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> ValueCache {
        ValueCache {
            map: RwLock::new(HashMap::with_capacity(1 << 14)),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: u64) -> Option<Score> {
        self.map.read().get(&key).copied()
    }

    pub fn insert(&self, key: u64, score: Score) {
        let mut map = self.map.write();
        if map.len() >= self.capacity {
            log::warn!("value cache full ({} entries), resetting", map.len());
            map.clear();
        }
        map.insert(key, score);
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        ValueCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let cache = ValueCache::new();
        assert_eq!(cache.get(42), None);
        cache.insert(42, 1234);
        assert_eq!(cache.get(42), Some(1234));
    }

    #[test]
    fn overflow_resets_whole_table() {
        let cache = ValueCache::with_capacity(4);
        for k in 0..4 {
            cache.insert(k, k as Score);
        }
        assert_eq!(cache.len(), 4);
        cache.insert(99, 99);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(99), Some(99));
        assert_eq!(cache.get(0), None);
    }
}
