//! Search request/response types. These map one-to-one onto the JSON the
//! host layer speaks, so field names are part of the wire format.

use crate::types::{Move, Score};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Piece-count threshold below which repetition avoidance activates.
pub const DEFAULT_REPETITION_THRESHOLD: usize = 40;

const DEFAULT_MAX_DEPTH: u32 = 3;
const DEFAULT_MCTS_SIMULATIONS: u32 = 400;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Iterative-deepening ceiling for the alpha-beta path.
    pub max_depth: u32,
    /// Per-search deadline; 0 means unlimited.
    pub time_limit_ms: u64,
    pub use_mcts: bool,
    /// Total playouts, divided evenly among the search threads.
    pub mcts_simulations: u32,
    /// Zobrist hash -> occurrence count over the game so far, for
    /// threefold-repetition avoidance in the endgame.
    pub repetition_history: HashMap<u64, u32>,
    /// Repetition handling switches on below this total piece count.
    pub repetition_threshold: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            time_limit_ms: 0,
            use_mcts: false,
            mcts_simulations: DEFAULT_MCTS_SIMULATIONS,
            repetition_history: HashMap::new(),
            repetition_threshold: DEFAULT_REPETITION_THRESHOLD,
        }
    }
}

impl SearchConfig {
    pub fn deadline(&self) -> Option<std::time::Instant> {
        (self.time_limit_ms > 0)
            .then(|| std::time::Instant::now() + std::time::Duration::from_millis(self.time_limit_ms))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    /// `{0,0}` when the position has no legal move; `{-1,-1}` when
    /// inference failed and no fallback was possible.
    pub best_move: Move,
    /// Red-centric: positive favours Red.
    pub score: Score,
    /// Red's win probability in `[0,1]`.
    pub win_prob: f32,
    pub depth: u32,
    pub nodes: i64,
    pub time_ms: u64,
    pub nn_failed: bool,
    pub pv: Vec<Move>,
}

impl SearchResult {
    pub(crate) fn no_moves() -> SearchResult {
        SearchResult {
            best_move: Move::NONE,
            score: 0,
            win_prob: 0.5,
            depth: 0,
            nodes: 0,
            time_ms: 0,
            nn_failed: false,
            pv: Vec::new(),
        }
    }
}

/// External status label for a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Ongoing,
    NoMoves,
}

impl GameStatus {
    pub fn of(pos: &crate::position::Position) -> GameStatus {
        if crate::movegen::legal(pos, false).is_empty() {
            GameStatus::NoMoves
        } else {
            GameStatus::Ongoing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    #[test]
    fn config_defaults_from_empty_json() {
        let cfg: SearchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
        assert!(!cfg.use_mcts);
        assert_eq!(cfg.repetition_threshold, DEFAULT_REPETITION_THRESHOLD);
    }

    #[test]
    fn status_labels() {
        assert_eq!(GameStatus::of(&Position::initial()), GameStatus::Ongoing);
        let stuck = Position::decode("13/13/13/13/13/13/13/13/13/13/13/13/4E8 w").unwrap();
        assert_eq!(GameStatus::of(&stuck), GameStatus::NoMoves);
    }
}
