//! The per-game engine: owns the caches, drives iterative deepening, and
//! fans the root out across workers.

use super::alpha_beta::{order_captures_first, promote_move, Worker, EVAL_SCALE};
use super::blunder::BlunderMemo;
use super::config::{SearchConfig, SearchResult};
use super::filters;
use super::tt::{Bound, TranspositionTable};
use crate::mcts;
use crate::movegen::{self, MoveList};
use crate::nn::{Oracle, OracleError, StageQuery, ValueCache};
use crate::position::Position;
use crate::types::{Move, PieceType, Score, SCORE_INF, SCORE_VCF_WIN};
use crate::vcf;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Root results within this absolute score gap are considered equal and
/// randomised 50/50 to vary play.
const ROOT_TOP_TWO_RANDOM_GAP: Score = 60;
/// Above this many pieces the pre-search connect-check probe is skipped.
const MAX_PIECES_FOR_ROOT_VCF: usize = 43;

/// One engine per game. Transposition and memo tables persist across
/// successive searches on the same game and are never shared between
/// engines.
pub struct Engine {
    tt: TranspositionTable,
    blunder: Arc<BlunderMemo>,
    nn: Option<Oracle>,
    nn_abort: Arc<AtomicBool>,
    nn_cache: Arc<ValueCache>,
    mcts_tree: Option<Arc<mcts::Tree>>,
    rng: Xoshiro256PlusPlus,
}

impl Engine {
    pub fn new() -> Engine {
        Engine::with_seed(rand::thread_rng().gen())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(seed: u64) -> Engine {
        Engine {
            tt: TranspositionTable::new(),
            blunder: Arc::new(BlunderMemo::new()),
            nn: None,
            nn_abort: Arc::new(AtomicBool::new(false)),
            nn_cache: Arc::new(ValueCache::new()),
            mcts_tree: None,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    pub fn attach_oracle(&mut self, oracle: Oracle) {
        self.nn = Some(oracle);
    }

    pub fn has_oracle(&self) -> bool {
        self.nn.is_some()
    }

    fn aborted(&self) -> bool {
        self.nn_abort.load(Ordering::Relaxed)
    }

    /// Search entry point. Always returns a structured result; errors are
    /// carried in-band (`nn_failed`, sentinel moves).
    pub fn search(&mut self, pos: &Position, cfg: &SearchConfig) -> SearchResult {
        self.nn_abort.store(false, Ordering::Relaxed);
        let start = Instant::now();

        if cfg.use_mcts {
            if self.nn.is_some() {
                return self.run_mcts(pos, cfg, start);
            }
            log::warn!("mcts requested without an oracle attached");
            return self.nn_failure_result(pos, start, 0);
        }

        let moves = filters::filter_lei_locked(pos, movegen::legal(pos, true));
        if moves.is_empty() {
            return SearchResult {
                time_ms: start.elapsed().as_millis() as u64,
                ..SearchResult::no_moves()
            };
        }

        // Terminal shortcut: a move that takes the king needs no search.
        if let Some(mv) = king_capture(pos, &moves) {
            return SearchResult {
                best_move: mv,
                score: SCORE_INF,
                win_prob: 1.0,
                depth: 1,
                nodes: 1,
                time_ms: start.elapsed().as_millis() as u64,
                nn_failed: false,
                pv: vec![mv],
            };
        }

        // Forced connect-check win beats anything the oracle might say.
        if pos.total_pieces() <= MAX_PIECES_FOR_ROOT_VCF {
            let probe = vcf::search(pos, vcf::ROOT_DEPTH);
            if probe.can_win {
                return SearchResult {
                    best_move: probe.mv,
                    score: SCORE_VCF_WIN,
                    win_prob: 1.0,
                    depth: vcf::ROOT_DEPTH,
                    nodes: 100,
                    time_ms: start.elapsed().as_millis() as u64,
                    nn_failed: false,
                    pv: vec![probe.mv],
                };
            }
        }

        let max_depth = if cfg.max_depth == 0 { 3 } else { cfg.max_depth };
        let deadline = cfg.deadline();

        let mut best_move = Move::NONE;
        let mut best_score: Score = 0;
        let mut best_depth = 0u32;
        let mut nodes_total: i64 = 0;

        for depth in 1..=max_depth {
            if self.aborted() {
                best_move = Move::NONE;
                break;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    break;
                }
            }
            let (score, mv, nodes) = self.alpha_beta_root(pos, depth, deadline);
            nodes_total += nodes;
            if self.aborted() {
                best_move = Move::NONE;
                break;
            }
            if mv.is_none() {
                break;
            }
            best_move = mv;
            best_score = score;
            best_depth = depth;
            log::debug!(
                "depth {depth}: best {mv} score {score} nodes {nodes_total} elapsed {:?}",
                start.elapsed()
            );
        }

        if self.aborted() {
            return self.nn_failure_result(pos, start, nodes_total);
        }

        let mut win_prob = ((best_score as f32 / EVAL_SCALE + 1.0) / 2.0).clamp(0.0, 1.0);
        // The reported probability comes from a fresh fixed-colour root
        // evaluation: shallow minimax amplification reads as absurdly
        // certain in a UI.
        if let Some(nn) = &self.nn {
            if let Ok(root_eval) = nn.evaluate(pos) {
                win_prob = root_eval.red_win;
            }
        }

        SearchResult {
            best_move,
            score: best_score,
            win_prob,
            depth: best_depth,
            nodes: nodes_total,
            time_ms: start.elapsed().as_millis() as u64,
            nn_failed: self.aborted(),
            pv: if best_move.is_none() {
                Vec::new()
            } else {
                vec![best_move]
            },
        }
    }

    fn run_mcts(&mut self, pos: &Position, cfg: &SearchConfig, start: Instant) -> SearchResult {
        let oracle = self.nn.clone().expect("mcts requires an oracle");
        let blunder = Arc::clone(&self.blunder);
        let nn_abort = Arc::clone(&self.nn_abort);
        let outcome = mcts::run(
            &oracle,
            blunder.as_ref(),
            nn_abort.as_ref(),
            &mut self.mcts_tree,
            pos,
            cfg,
            start,
        );
        match outcome {
            Some(result) => result,
            None => self.nn_failure_result(pos, start, 0),
        }
    }

    /// Root ply: order by policy, search every child on its own worker,
    /// pick by score with a small randomised tie window.
    fn alpha_beta_root(
        &mut self,
        pos: &Position,
        depth: u32,
        deadline: Option<Instant>,
    ) -> (Score, Move, i64) {
        if self.aborted() {
            return (0, Move::NONE, 0);
        }

        let moves = movegen::legal(pos, true);
        let moves = filters::filter_lei_locked(pos, moves);
        let moves = self.blunder.filter(pos, &moves);
        let mut moves = vcf::filter_losing_moves(pos, moves, vcf::FILTER_DEPTH);
        if moves.is_empty() {
            let (score, nodes) = self.static_eval(pos);
            return (score, Move::NONE, nodes);
        }

        if let Some(nn) = self.nn.clone() {
            if let Err(err) = order_moves_by_policy(&nn, pos, &mut moves) {
                log::warn!("root policy ordering failed: {err}");
                self.nn_abort.store(true, Ordering::Relaxed);
                return (0, Move::NONE, 0);
            }
        } else {
            order_captures_first(pos, &mut moves);
        }

        let key = pos.hash;
        if let Some(entry) = self.tt.probe(key) {
            promote_move(&mut moves, entry.mv);
        }

        let children: Vec<(Move, Position)> = moves
            .iter()
            .filter_map(|&mv| pos.apply_move(mv).map(|child| (mv, child)))
            .collect();
        if children.is_empty() {
            let (score, nodes) = self.static_eval(pos);
            return (score, Move::NONE, nodes);
        }

        let blunder = self.blunder.as_ref();
        let nn = self.nn.as_ref();
        let nn_abort = self.nn_abort.as_ref();
        let nn_cache = self.nn_cache.as_ref();

        let (mut results, nodes) = if children.len() == 1 {
            let (mv, child) = &children[0];
            let mut worker = Worker::new(blunder, nn, nn_abort, nn_cache);
            let score = worker.alpha_beta(child, depth - 1, -SCORE_INF, SCORE_INF, deadline);
            (vec![(*mv, score)], worker.nodes)
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = children
                    .iter()
                    .map(|(mv, child)| {
                        scope.spawn(move || {
                            let mut worker = Worker::new(blunder, nn, nn_abort, nn_cache);
                            let score =
                                worker.alpha_beta(child, depth - 1, -SCORE_INF, SCORE_INF, deadline);
                            (*mv, score, worker.nodes)
                        })
                    })
                    .collect();
                let mut results = Vec::with_capacity(handles.len());
                let mut nodes = 0i64;
                for handle in handles {
                    let (mv, score, n) = handle.join().expect("root worker panicked");
                    results.push((mv, score));
                    nodes += n;
                }
                (results, nodes)
            })
        };

        if self.aborted() {
            return (0, Move::NONE, nodes);
        }

        // Best from the root side's perspective.
        if pos.side_to_move == crate::types::Side::Red {
            results.sort_by_key(|(_, s)| std::cmp::Reverse(*s));
        } else {
            results.sort_by_key(|(_, s)| *s);
        }

        let mut best = results[0];
        if let Some(second) = results.get(1) {
            if (best.1 - second.1).abs() <= ROOT_TOP_TWO_RANDOM_GAP && self.rng.gen_bool(0.5) {
                best = *second;
            }
        }

        if best.0.is_none() {
            let (score, extra) = self.static_eval(pos);
            return (score, Move::NONE, nodes + extra);
        }

        self.tt.store(key, depth, best.1, Bound::Exact, best.0);
        (best.1, best.0, nodes)
    }

    fn static_eval(&mut self, pos: &Position) -> (Score, i64) {
        let mut worker = Worker::new(
            self.blunder.as_ref(),
            self.nn.as_ref(),
            self.nn_abort.as_ref(),
            self.nn_cache.as_ref(),
        );
        (worker.eval(pos), worker.nodes)
    }

    /// Inference died mid-search: pick a uniformly random filtered legal
    /// move as a fallback. The host must surface this rather than commit
    /// the move silently.
    fn nn_failure_result(&mut self, pos: &Position, start: Instant, nodes: i64) -> SearchResult {
        let moves = filters::filter_lei_locked(pos, movegen::legal(pos, true));
        let best_move = if moves.is_empty() {
            Move::NN_FAILED
        } else {
            moves[self.rng.gen_range(0..moves.len())]
        };
        SearchResult {
            best_move,
            score: 0,
            win_prob: 0.5,
            depth: 0,
            nodes,
            time_ms: start.elapsed().as_millis() as u64,
            nn_failed: true,
            pv: Vec::new(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

fn king_capture(pos: &Position, moves: &MoveList) -> Option<Move> {
    moves
        .iter()
        .copied()
        .find(|mv| pos.board.squares[mv.to_sq()].kind() == Some(PieceType::King))
}

/// Order root moves by the two-stage policy: the product of the origin
/// prior and the destination prior. Stage-1 queries fan out per distinct
/// origin and join before sorting.
fn order_moves_by_policy(
    oracle: &Oracle,
    pos: &Position,
    moves: &mut MoveList,
) -> Result<(), OracleError> {
    let stage0 = oracle.evaluate_stage(pos, StageQuery::Choose)?;

    let mut origins: Vec<usize> = Vec::new();
    for mv in moves.iter() {
        if !origins.contains(&mv.from_sq()) {
            origins.push(mv.from_sq());
        }
    }

    let mut stage1: HashMap<usize, _> = HashMap::with_capacity(origins.len());
    let results: Vec<(usize, Result<_, OracleError>)> = std::thread::scope(|scope| {
        origins
            .iter()
            .map(|&origin| {
                scope.spawn(move || {
                    (
                        origin,
                        oracle.evaluate_stage(pos, StageQuery::Place { origin }),
                    )
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().expect("stage-1 query panicked"))
            .collect()
    });
    for (origin, res) in results {
        stage1.insert(origin, res?);
    }

    let mut scored: Vec<(Move, f32)> = moves
        .iter()
        .map(|&mv| {
            let p_from = stage0.policy[mv.from_sq()].max(0.0);
            let p_to = stage1[&mv.from_sq()].policy[mv.to_sq()].max(0.0);
            (mv, p_from * p_to)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    moves.clear();
    moves.extend(scored.into_iter().map(|(mv, _)| mv));
    Ok(())
}

/// Errors from the external play path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayError {
    /// Not a legal move in this position.
    IllegalMove,
    /// The move would repeat a position for the third time in the endgame.
    RepetitionForbidden,
}

impl std::fmt::Display for PlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayError::IllegalMove => write!(f, "illegal move"),
            PlayError::RepetitionForbidden => write!(f, "move repeats the position a third time"),
        }
    }
}

impl std::error::Error for PlayError {}

/// Validate and apply an externally supplied move, enforcing the endgame
/// threefold-repetition gate against the game's hash history.
pub fn try_play(
    pos: &Position,
    mv: Move,
    history: &HashMap<u64, u32>,
    repetition_threshold: usize,
) -> Result<Position, PlayError> {
    if !movegen::legal(pos, false).contains(&mv) {
        return Err(PlayError::IllegalMove);
    }
    let next = pos.apply_move(mv).ok_or(PlayError::IllegalMove)?;
    if pos.total_pieces() < repetition_threshold
        && history.get(&next.hash).copied().unwrap_or(0) >= 2
    {
        return Err(PlayError::RepetitionForbidden);
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::index_of;
    use crate::search::config::DEFAULT_REPETITION_THRESHOLD;

    #[test]
    fn no_moves_yields_sentinel() {
        let mut engine = Engine::with_seed(1);
        let pos = Position::decode("13/13/13/13/13/13/13/13/13/13/13/13/4E8 w").unwrap();
        let res = engine.search(&pos, &SearchConfig::default());
        assert_eq!(res.best_move, Move::NONE);
        assert!(res.score >= 0);
        assert!(!res.nn_failed);
    }

    #[test]
    fn king_capture_shortcut() {
        // Red rook a clear file from the black king.
        let fen = "13/13/3bcdedcb3/13/13/13/6A6/13/13/13/13/3BCDEDCB3/13 w";
        let pos = Position::decode(fen).unwrap();
        let mut engine = Engine::with_seed(1);
        let res = engine.search(&pos, &SearchConfig::default());
        assert_eq!(res.score, SCORE_INF);
        let king = pos.king_square(crate::types::Side::Black).unwrap();
        assert_eq!(res.best_move.to_sq(), king);
        assert_eq!(res.depth, 1);
    }

    #[test]
    fn root_vcf_shortcut() {
        let fen = format!("{} w", crate::vcf::MATE_FIXTURE);
        let pos = Position::decode(&fen).unwrap();
        let mut engine = Engine::with_seed(1);
        let res = engine.search(&pos, &SearchConfig::default());
        assert_eq!(res.score, SCORE_VCF_WIN);
        assert_eq!(
            pos.board.squares[res.best_move.from_sq()].kind(),
            Some(PieceType::Cannon)
        );
        assert!((res.win_prob - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn search_without_oracle_reports_failure() {
        let mut engine = Engine::with_seed(7);
        let pos = Position::initial();
        let res = engine.search(&pos, &SearchConfig::default());
        assert!(res.nn_failed);
        // The fallback move is drawn from the filtered legal list.
        let moves = filters::filter_lei_locked(&pos, movegen::legal(&pos, true));
        assert!(moves.contains(&res.best_move));
    }

    #[test]
    fn play_gate_rejects_illegal_and_repetition() {
        let pos = Position::initial();
        // Moving a black piece while Red is to move.
        let bad = Move::new(index_of(0, 2), index_of(4, 2));
        assert_eq!(
            try_play(&pos, bad, &HashMap::new(), DEFAULT_REPETITION_THRESHOLD),
            Err(PlayError::IllegalMove)
        );

        // Endgame shuffle: entering a twice-seen hash a third time.
        let endgame =
            Position::decode("4e8/13/13/13/13/13/13/13/13/13/13/6A6/6E6 w").unwrap();
        assert!(endgame.total_pieces() < DEFAULT_REPETITION_THRESHOLD);
        let shuffle = Move::new(index_of(11, 6), index_of(11, 7));
        let next = endgame.apply_move(shuffle).unwrap();
        let mut history = HashMap::new();
        history.insert(next.hash, 2);
        assert_eq!(
            try_play(&endgame, shuffle, &history, DEFAULT_REPETITION_THRESHOLD),
            Err(PlayError::RepetitionForbidden)
        );
        // With a fresh history the same move is fine.
        assert!(try_play(&endgame, shuffle, &HashMap::new(), DEFAULT_REPETITION_THRESHOLD).is_ok());
    }
}
