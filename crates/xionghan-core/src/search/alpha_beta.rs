//! The inner fail-soft alpha-beta recursion.
//!
//! One `Worker` per root child. Workers never share mutable state: each
//! owns its transposition table and node counter, while the oracle, the
//! leaf-value cache, the give-away memo, and the abort latch are shared
//! read-mostly.

use super::blunder::BlunderMemo;
use super::filters;
use super::tt::{Bound, TranspositionTable};
use crate::movegen::{self, MoveList};
use crate::nn::{Oracle, ValueCache};
use crate::position::Position;
use crate::types::{Move, Score, Side};
use crate::vcf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Leaf values are the oracle's red-win minus black-win, scaled to
/// centi-probabilities.
pub(crate) const EVAL_SCALE: f32 = 10_000.0;

pub(crate) struct Worker<'a> {
    pub tt: TranspositionTable,
    pub blunder: &'a BlunderMemo,
    pub nn: Option<&'a Oracle>,
    pub nn_abort: &'a AtomicBool,
    pub nn_cache: &'a ValueCache,
    pub nodes: i64,
}

impl<'a> Worker<'a> {
    pub fn new(
        blunder: &'a BlunderMemo,
        nn: Option<&'a Oracle>,
        nn_abort: &'a AtomicBool,
        nn_cache: &'a ValueCache,
    ) -> Worker<'a> {
        Worker {
            tt: TranspositionTable::new(),
            blunder,
            nn,
            nn_abort,
            nn_cache,
            nodes: 0,
        }
    }

    #[inline]
    pub fn aborted(&self) -> bool {
        self.nn_abort.load(Ordering::Relaxed)
    }

    #[inline]
    fn abort(&self) {
        self.nn_abort.store(true, Ordering::Relaxed);
    }

    /// Leaf evaluation: red-centric score from the oracle, memoised by
    /// Zobrist key. Latches the abort flag on any inference failure.
    pub fn eval(&mut self, pos: &Position) -> Score {
        let nn = match self.nn {
            Some(nn) => nn,
            None => {
                self.abort();
                return 0;
            }
        };
        if let Some(score) = self.nn_cache.get(pos.hash) {
            return score;
        }
        match nn.evaluate(pos) {
            Ok(eval) => {
                let score = ((eval.red_win - eval.black_win) * EVAL_SCALE) as Score;
                self.nn_cache.insert(pos.hash, score);
                score
            }
            Err(err) => {
                log::warn!("leaf evaluation failed, aborting search: {err}");
                self.abort();
                0
            }
        }
    }

    /// Legal moves with the full root-quality filter stack.
    fn filtered_moves(&mut self, pos: &Position) -> MoveList {
        let moves = movegen::legal(pos, true);
        let moves = filters::filter_lei_locked(pos, moves);
        let moves = self.blunder.filter(pos, &moves);
        vcf::filter_losing_moves(pos, moves, vcf::FILTER_DEPTH)
    }

    pub fn alpha_beta(
        &mut self,
        pos: &Position,
        depth: u32,
        mut alpha: Score,
        mut beta: Score,
        deadline: Option<Instant>,
    ) -> Score {
        self.nodes += 1;
        if self.aborted() {
            return 0;
        }
        if depth == 0 {
            return self.eval(pos);
        }
        if let Some(deadline) = deadline {
            // Out of time: the cached leaf value is the best cheap answer.
            if Instant::now() >= deadline {
                return self.eval(pos);
            }
        }

        let key = pos.hash;
        let (orig_alpha, orig_beta) = (alpha, beta);
        let mut tt_move = Move::NONE;
        if let Some(entry) = self.tt.probe(key) {
            tt_move = entry.mv;
            if entry.depth >= depth {
                match entry.bound {
                    Bound::Exact => return entry.score,
                    Bound::Upper => {
                        if entry.score <= alpha {
                            return entry.score;
                        }
                        beta = beta.min(entry.score);
                    }
                    Bound::Lower => {
                        if entry.score >= beta {
                            return entry.score;
                        }
                        alpha = alpha.max(entry.score);
                    }
                }
                if alpha >= beta {
                    return entry.score;
                }
            }
        }

        let mut moves = self.filtered_moves(pos);
        if moves.is_empty() {
            return self.eval(pos);
        }
        order_captures_first(pos, &mut moves);
        promote_move(&mut moves, tt_move);

        let side = pos.side_to_move;
        let mut best_score = if side == Side::Red {
            Score::MIN
        } else {
            Score::MAX
        };
        let mut best_move = Move::NONE;

        for &mv in moves.iter() {
            let child = match pos.apply_move(mv) {
                Some(p) => p,
                None => continue,
            };
            let score = self.alpha_beta(&child, depth - 1, alpha, beta, deadline);
            if self.aborted() {
                return 0;
            }
            if side == Side::Red {
                if score > best_score {
                    best_score = score;
                    best_move = mv;
                }
                alpha = alpha.max(score);
            } else {
                if score < best_score {
                    best_score = score;
                    best_move = mv;
                }
                beta = beta.min(score);
            }
            if alpha >= beta {
                break;
            }
        }

        if best_move.is_none() {
            return self.eval(pos);
        }

        let bound = if best_score <= orig_alpha {
            Bound::Upper
        } else if best_score >= orig_beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        self.tt.store(key, depth, best_score, bound, best_move);
        best_score
    }
}

/// Captures to the front, quiet moves behind, otherwise order-preserving.
pub(crate) fn order_captures_first(pos: &Position, moves: &mut MoveList) {
    moves.sort_by_key(|mv| pos.board.squares[mv.to_sq()].is_empty());
}

/// Move `mv` to the head of the list if present.
pub(crate) fn promote_move(moves: &mut MoveList, mv: Move) {
    if mv.is_none() {
        return;
    }
    if let Some(idx) = moves.iter().position(|&m| m == mv) {
        moves[..=idx].rotate_right(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker_parts() -> (BlunderMemo, AtomicBool, ValueCache) {
        (BlunderMemo::new(), AtomicBool::new(false), ValueCache::new())
    }

    #[test]
    fn missing_oracle_latches_abort() {
        let (blunder, abort, cache) = worker_parts();
        let mut w = Worker::new(&blunder, None, &abort, &cache);
        let pos = Position::initial();
        assert_eq!(w.eval(&pos), 0);
        assert!(w.aborted());
    }

    #[test]
    fn capture_ordering_is_stable_within_classes() {
        let fen = "6e6/13/13/6g6/13/13/6A6/13/13/13/13/13/6E6 w";
        let pos = Position::decode(fen).unwrap();
        let mut moves = movegen::legal(&pos, false);
        order_captures_first(&pos, &mut moves);
        let first_quiet = moves
            .iter()
            .position(|mv| pos.board.squares[mv.to_sq()].is_empty())
            .unwrap_or(moves.len());
        for mv in &moves[first_quiet..] {
            assert!(pos.board.squares[mv.to_sq()].is_empty());
        }
        for mv in &moves[..first_quiet] {
            assert!(!pos.board.squares[mv.to_sq()].is_empty());
        }
    }

    #[test]
    fn promotion_puts_move_first_keeping_rest() {
        let mut moves: MoveList = [
            Move::new(1, 2),
            Move::new(3, 4),
            Move::new(5, 6),
            Move::new(7, 8),
        ]
        .into_iter()
        .collect();
        promote_move(&mut moves, Move::new(5, 6));
        assert_eq!(moves[0], Move::new(5, 6));
        assert_eq!(moves[1], Move::new(1, 2));
        assert_eq!(moves[2], Move::new(3, 4));
        // Absent move: untouched.
        let before = moves.clone();
        promote_move(&mut moves, Move::new(100, 101));
        assert_eq!(moves, before);
    }
}
