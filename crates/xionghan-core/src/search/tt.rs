//! Transposition table for the alpha-beta searchers.
//!
//! Keyed on the position's Zobrist hash. Bounded: exceeding capacity wipes
//! the table (generational reset, no eviction bookkeeping). Each root
//! worker owns a private table, so no locking.

use crate::types::{Move, Score};
use std::collections::HashMap;

/// How a stored score relates to the true minimax value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Exact,
    /// Score is at most this (fail-low).
    Upper,
    /// Score is at least this (fail-high).
    Lower,
}

#[derive(Clone, Copy, Debug)]
pub struct TtEntry {
    pub depth: u32,
    pub score: Score,
    pub bound: Bound,
    pub mv: Move,
}

const DEFAULT_CAPACITY: usize = 1_000_000;

pub struct TranspositionTable {
    map: HashMap<u64, TtEntry>,
    capacity: usize,
}

impl TranspositionTable {
    pub fn new() -> TranspositionTable {
        TranspositionTable::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> TranspositionTable {
        TranspositionTable {
            map: HashMap::with_capacity(1 << 14),
            capacity: capacity.max(1),
        }
    }

    #[inline]
    pub fn probe(&self, key: u64) -> Option<&TtEntry> {
        self.map.get(&key)
    }

    /// Replace when strictly deeper, or at equal depth when the new entry
    /// is Exact and the old one is not.
    pub fn store(&mut self, key: u64, depth: u32, score: Score, bound: Bound, mv: Move) {
        if self.map.len() > self.capacity {
            log::warn!("transposition table full ({} entries), resetting", self.map.len());
            self.map.clear();
        }
        match self.map.get(&key) {
            Some(old)
                if old.depth > depth
                    || (old.depth == depth && !(bound == Bound::Exact && old.bound != Bound::Exact)) =>
            {
            }
            _ => {
                self.map.insert(
                    key,
                    TtEntry {
                        depth,
                        score,
                        bound,
                        mv,
                    },
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        TranspositionTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MV: Move = Move { from: 1, to: 2 };
    const MV2: Move = Move { from: 3, to: 4 };

    #[test]
    fn deeper_replaces_shallower() {
        let mut tt = TranspositionTable::new();
        tt.store(7, 2, 100, Bound::Exact, MV);
        tt.store(7, 5, 200, Bound::Lower, MV2);
        let e = tt.probe(7).unwrap();
        assert_eq!(e.depth, 5);
        assert_eq!(e.score, 200);
    }

    #[test]
    fn shallower_never_replaces() {
        let mut tt = TranspositionTable::new();
        tt.store(7, 5, 200, Bound::Lower, MV);
        tt.store(7, 2, 100, Bound::Exact, MV2);
        assert_eq!(tt.probe(7).unwrap().depth, 5);
    }

    #[test]
    fn equal_depth_exact_wins_over_bound() {
        let mut tt = TranspositionTable::new();
        tt.store(7, 3, 100, Bound::Upper, MV);
        tt.store(7, 3, 150, Bound::Exact, MV2);
        let e = tt.probe(7).unwrap();
        assert_eq!(e.bound, Bound::Exact);
        assert_eq!(e.mv, MV2);
        // ... but a same-depth non-exact does not displace an exact.
        tt.store(7, 3, 80, Bound::Lower, MV);
        assert_eq!(tt.probe(7).unwrap().bound, Bound::Exact);
    }

    #[test]
    fn overflow_resets() {
        let mut tt = TranspositionTable::with_capacity(4);
        for k in 0..6 {
            tt.store(k, 1, 0, Bound::Exact, MV);
        }
        assert!(tt.len() < 6);
    }
}
