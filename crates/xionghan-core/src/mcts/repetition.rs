//! Threefold-repetition avoidance, active only in the endgame.
//!
//! The game history supplies a base count per hash; each search thread
//! layers the hashes entered during the current playout on top. Entering
//! a position whose combined count is already two would complete the
//! threefold and is forbidden outright; positions merely approaching it
//! get a soft utility penalty instead.

use crate::position::Position;
use crate::search::SearchConfig;
use std::collections::HashMap;

/// Soft Q penalty per prior occurrence of the child position.
pub(crate) const REPETITION_PENALTY: f64 = 0.15;

pub(crate) struct RepetitionState {
    pub enabled: bool,
    base: HashMap<u64, u32>,
    path: Vec<u64>,
}

impl RepetitionState {
    pub fn from_config(pos: &Position, cfg: &SearchConfig) -> RepetitionState {
        let enabled =
            pos.total_pieces() < cfg.repetition_threshold && !cfg.repetition_history.is_empty();
        RepetitionState {
            enabled,
            base: if enabled {
                cfg.repetition_history.clone()
            } else {
                HashMap::new()
            },
            path: Vec::new(),
        }
    }

    /// A fresh per-thread view sharing the same base counts.
    pub fn clone_for_thread(&self) -> RepetitionState {
        RepetitionState {
            enabled: self.enabled,
            base: self.base.clone(),
            path: Vec::new(),
        }
    }

    #[inline]
    pub fn base_count(&self, hash: u64) -> u32 {
        self.base.get(&hash).copied().unwrap_or(0)
    }

    fn count(&self, hash: u64) -> u32 {
        self.base_count(hash) + self.path.iter().filter(|&&h| h == hash).count() as u32
    }

    /// Entering `hash` must not complete a threefold.
    #[inline]
    pub fn can_enter(&self, hash: u64) -> bool {
        !self.enabled || self.count(hash) < 2
    }

    pub fn push(&mut self, hash: u64) {
        if self.enabled {
            self.path.push(hash);
        }
    }

    pub fn pop(&mut self, hash: u64) {
        if self.enabled {
            if let Some(idx) = self.path.iter().rposition(|&h| h == hash) {
                self.path.remove(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endgame_cfg(history: &[(u64, u32)]) -> SearchConfig {
        SearchConfig {
            repetition_history: history.iter().copied().collect(),
            ..SearchConfig::default()
        }
    }

    fn endgame_pos() -> Position {
        Position::decode("4e8/13/13/13/13/13/13/13/13/13/13/6A6/6E6 w").unwrap()
    }

    #[test]
    fn disabled_outside_endgame() {
        let cfg = endgame_cfg(&[(7, 2)]);
        let rep = RepetitionState::from_config(&Position::initial(), &cfg);
        assert!(!rep.enabled);
        assert!(rep.can_enter(7));
    }

    #[test]
    fn forbids_third_occurrence() {
        let cfg = endgame_cfg(&[(7, 2), (9, 1)]);
        let rep = RepetitionState::from_config(&endgame_pos(), &cfg);
        assert!(rep.enabled);
        assert!(!rep.can_enter(7));
        assert!(rep.can_enter(9));
        assert!(rep.can_enter(8));
    }

    #[test]
    fn playout_path_counts_toward_the_limit() {
        let cfg = endgame_cfg(&[(7, 1)]);
        let mut rep = RepetitionState::from_config(&endgame_pos(), &cfg);
        assert!(rep.can_enter(7));
        rep.push(7);
        assert!(!rep.can_enter(7));
        rep.pop(7);
        assert!(rep.can_enter(7));
    }
}
