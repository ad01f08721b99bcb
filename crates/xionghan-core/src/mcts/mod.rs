//! Parallel PUCT search with virtual losses.
//!
//! Threads descend the shared tree, each expanding at most one leaf per
//! playout through the batched oracle. Edge visits live on the parent, a
//! CAS state machine guarantees a single expander per node, and backprop
//! updates run under the node's write lock. With repetition constraints
//! off, nodes are pooled by Zobrist hash so transposed lines share
//! statistics; with them on, paths are history-dependent and the tree is
//! rebuilt per search.

mod node;
mod repetition;

pub use node::Tree;

use node::{ChildEdge, Node, STATE_EVALUATING, STATE_EXPANDED, STATE_UNEVALUATED};
use repetition::{RepetitionState, REPETITION_PENALTY};

use crate::movegen::{self, MoveList};
use crate::nn::{Evaluation, Oracle, StageQuery};
use crate::position::Position;
use crate::search::{filters, BlunderMemo, SearchConfig, SearchResult};
use crate::types::{Move, PieceType, Side, SCORE_INF, SCORE_VCF_WIN};
use crate::vcf;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CPUCT_EXPLORATION: f64 = 1.1;
const CPUCT_EXPLORATION_BASE: f64 = 10_000.0;
const CPUCT_EXPLORATION_LOG: f64 = 0.45;
const FPU_REDUCTION_MAX: f64 = 0.2;
/// Nudge away from dead-equal draws, against the side to move.
const CONTEMPT: f64 = 0.03;
const CONTEMPT_BAND: f64 = 0.05;
const ROOT_LCB_ENABLED: bool = true;
const ROOT_LCB_STDEVS: f64 = 4.0;
const ROOT_LCB_MIN_VISIT_PROP: f64 = 0.1;
/// Stage-0 priors at or below this skip the stage-1 query; their moves
/// share the origin prior uniformly.
const NEGLIGIBLE_PRIOR: f32 = 1e-6;
/// Pool size that triggers a rebuild at the next search.
const POOL_RESET_SIZE: usize = 300_000;
const MAX_PIECES_FOR_ROOT_VCF: usize = 43;

/// Runs the PUCT search. Returns `None` when root expansion could not get
/// a network answer; the caller produces the failure result.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    oracle: &Oracle,
    blunder: &BlunderMemo,
    nn_abort: &AtomicBool,
    pool: &mut Option<Arc<Tree>>,
    pos: &Position,
    cfg: &SearchConfig,
    start: Instant,
) -> Option<SearchResult> {
    let rep_base = RepetitionState::from_config(pos, cfg);

    let moves = filters::filter_lei_locked(pos, movegen::legal(pos, true));
    if moves.is_empty() {
        return Some(SearchResult {
            time_ms: start.elapsed().as_millis() as u64,
            ..SearchResult::no_moves()
        });
    }

    // Terminal shortcut, gated so it cannot walk into a forbidden
    // repetition.
    for &mv in moves.iter() {
        if pos.board.squares[mv.to_sq()].kind() != Some(PieceType::King) {
            continue;
        }
        if let Some(next) = pos.apply_move(mv) {
            if rep_base.can_enter(next.hash) {
                return Some(SearchResult {
                    best_move: mv,
                    score: SCORE_INF,
                    win_prob: 1.0,
                    depth: 1,
                    nodes: 1,
                    time_ms: start.elapsed().as_millis() as u64,
                    nn_failed: false,
                    pv: vec![mv],
                });
            }
        }
    }

    if pos.total_pieces() <= MAX_PIECES_FOR_ROOT_VCF {
        let probe = vcf::search(pos, vcf::ROOT_DEPTH);
        if probe.can_win {
            let allowed = pos
                .apply_move(probe.mv)
                .map(|next| rep_base.can_enter(next.hash))
                .unwrap_or(false);
            if allowed {
                return Some(SearchResult {
                    best_move: probe.mv,
                    score: SCORE_VCF_WIN,
                    win_prob: 1.0,
                    depth: vcf::ROOT_DEPTH,
                    nodes: 100,
                    time_ms: start.elapsed().as_millis() as u64,
                    nn_failed: false,
                    pv: vec![probe.mv],
                });
            }
        }
    }

    // Repetition constraints make node values path-dependent; pooling
    // across paths would conflate them.
    let allow_transposition = !rep_base.enabled;
    let tree: Arc<Tree> = if allow_transposition {
        match pool {
            Some(existing) if existing.transposition() && existing.len() <= POOL_RESET_SIZE => {
                Arc::clone(existing)
            }
            _ => {
                let fresh = Arc::new(Tree::new(true));
                *pool = Some(Arc::clone(&fresh));
                fresh
            }
        }
    } else {
        Arc::new(Tree::new(false))
    };

    let root_id = tree.get_or_alloc(pos.hash, || Node::new(Move::NONE, pos.side_to_move, pos.hash));
    let root = tree.get(root_id);

    if root.state.load(Ordering::Acquire) == STATE_UNEVALUATED {
        let eval = match oracle.evaluate(pos) {
            Ok(eval) => eval,
            Err(err) => {
                log::warn!("root evaluation failed: {err}");
                nn_abort.store(true, Ordering::Relaxed);
                return None;
            }
        };
        if root
            .state
            .compare_exchange(
                STATE_UNEVALUATED,
                STATE_EVALUATING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            // Root expansion keeps the full expert filter stack so the
            // first move is never an obvious give-away.
            expand_node(&tree, &root, pos, &eval, true, oracle, blunder);
            let mut stats = root.stats.write();
            if stats.visits == 0 {
                // The root's own evaluation counts as its first visit;
                // every later visit descends exactly one edge.
                let utility = (eval.red_win as f64) * 2.0 - 1.0;
                stats.visits = 1;
                stats.weight_sum = 1.0;
                stats.utility_avg = utility;
                stats.utility_sq_avg = utility * utility;
            }
        }
    }

    let threads = oracle.suggested_search_threads();
    let sims_per_thread = (cfg.mcts_simulations as usize / threads).max(1);
    let deadline = (cfg.time_limit_ms > 0)
        .then(|| start + Duration::from_millis(cfg.time_limit_ms));

    std::thread::scope(|scope| {
        for _ in 0..threads {
            let tree = Arc::clone(&tree);
            let mut rep = rep_base.clone_for_thread();
            let root = Arc::clone(&root);
            scope.spawn(move || {
                for _ in 0..sims_per_thread {
                    if let Some(d) = deadline {
                        if Instant::now() >= d {
                            break;
                        }
                    }
                    playout(&tree, &root, pos, &mut rep, oracle, blunder);
                }
            });
        }
    });

    let stats = root.stats.read();
    let mut best_move = Move::NONE;
    let mut max_edge = -1i64;
    for (mv, edge) in &stats.children {
        if edge.edge_visits > max_edge {
            max_edge = edge.edge_visits;
            best_move = *mv;
        }
    }

    let red_win_prob = ((stats.utility_avg + 1.0) / 2.0).clamp(0.0, 1.0);
    Some(SearchResult {
        best_move,
        score: ((red_win_prob * 2.0 - 1.0) * 10_000.0) as i32,
        win_prob: red_win_prob as f32,
        depth: 0,
        nodes: stats.visits,
        time_ms: start.elapsed().as_millis() as u64,
        nn_failed: nn_abort.load(Ordering::Relaxed),
        pv: if best_move.is_none() {
            Vec::new()
        } else {
            vec![best_move]
        },
    })
}

/// Red-centric utility of a side with no moves: the mover loses.
#[inline]
fn terminal_utility(side_to_move: Side) -> f64 {
    match side_to_move {
        Side::Red => -1.0,
        Side::Black => 1.0,
    }
}

/// Near-zero utilities are shifted against the side to move so the search
/// does not drift into draws out of indifference.
#[inline]
fn apply_contempt(utility: f64, side_to_move: Side) -> f64 {
    if utility.abs() < CONTEMPT_BAND {
        match side_to_move {
            Side::Red => utility - CONTEMPT,
            Side::Black => utility + CONTEMPT,
        }
    } else {
        utility
    }
}

fn playout(
    tree: &Tree,
    root: &Arc<Node>,
    root_pos: &Position,
    rep: &mut RepetitionState,
    oracle: &Oracle,
    blunder: &BlunderMemo,
) {
    let mut node = Arc::clone(root);
    let mut cur = *root_pos;
    let mut path: Vec<Arc<Node>> = vec![Arc::clone(&node)];
    let mut edges: Vec<Move> = Vec::new();

    // Selection.
    loop {
        if node.state.load(Ordering::Acquire) != STATE_EXPANDED
            || node.terminal.load(Ordering::Relaxed)
        {
            break;
        }
        let is_root = path.len() == 1;
        let Some((mv, child)) = select_child(tree, &node, rep, is_root) else {
            break;
        };
        child.virtual_losses.fetch_add(1, Ordering::Relaxed);
        node = child;
        path.push(Arc::clone(&node));
        edges.push(mv);
        rep.push(node.hash);
        match cur.apply_move(mv) {
            Some(next) => cur = next,
            None => break,
        }
    }

    // Expansion / evaluation.
    let mut utility;
    loop {
        if node.terminal.load(Ordering::Relaxed) {
            utility = terminal_utility(cur.side_to_move);
            break;
        }
        let state = node.state.load(Ordering::Acquire);
        if state == STATE_EXPANDED {
            utility = node.stats.read().nn_value;
            utility = apply_contempt(utility, cur.side_to_move);
            break;
        }
        if state == STATE_UNEVALUATED
            && node
                .state
                .compare_exchange(
                    STATE_UNEVALUATED,
                    STATE_EVALUATING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            match oracle.evaluate(&cur) {
                Ok(eval) => {
                    expand_node(tree, &node, &cur, &eval, false, oracle, blunder);
                    utility = (eval.red_win as f64) * 2.0 - 1.0;
                }
                Err(_) => {
                    // Back off with the running average and let another
                    // playout retry the evaluation.
                    utility = node.stats.read().utility_avg;
                    node.state.store(STATE_UNEVALUATED, Ordering::Release);
                }
            }
            utility = apply_contempt(utility, cur.side_to_move);
            break;
        }
        // Another thread is mid-expansion; wait for its result.
        std::thread::yield_now();
    }

    // Backpropagation, leaf to root.
    for i in (0..path.len()).rev() {
        let n = &path[i];
        {
            let mut stats = n.stats.write();
            stats.visits += 1;
            stats.weight_sum += 1.0;
            let visits = stats.visits as f64;
            stats.utility_avg += (utility - stats.utility_avg) / visits;
            stats.utility_sq_avg += (utility * utility - stats.utility_sq_avg) / visits;
        }
        if i > 0 {
            let parent = &path[i - 1];
            let mv = edges[i - 1];
            if let Some(edge) = parent.stats.write().children.get_mut(&mv) {
                edge.edge_visits += 1;
            }
            n.virtual_losses.fetch_sub(1, Ordering::Relaxed);
            rep.pop(n.hash);
        }
    }
}

/// PUCT child selection under the parent's shared lock.
fn select_child(
    tree: &Tree,
    node: &Node,
    rep: &RepetitionState,
    is_root: bool,
) -> Option<(Move, Arc<Node>)> {
    let stats = node.stats.read();
    let visits = stats.visits;

    let stdev = (stats.utility_sq_avg - stats.utility_avg * stats.utility_avg)
        .max(0.0)
        .sqrt();
    let stdev_factor = (1.0 + 0.5 * (stdev / 0.4 - 1.0)).clamp(0.5, 2.0);
    let cpuct = (CPUCT_EXPLORATION
        + CPUCT_EXPLORATION_LOG
            * ((visits as f64 + CPUCT_EXPLORATION_BASE) / CPUCT_EXPLORATION_BASE).ln())
        * stdev_factor;
    let sqrt_visits = (visits as f64 + 0.01).sqrt();

    let fpu_reduction = FPU_REDUCTION_MAX * ((visits as f64 / 100.0).clamp(0.0, 1.0)).sqrt();
    let fpu_base = if node.next_to_move == Side::Black {
        -stats.nn_value
    } else {
        stats.nn_value
    };
    let fpu_value = fpu_base - fpu_reduction;

    // Root LCB gate threshold: largest edge-visit count among children we
    // may actually enter.
    let mut max_edge_visits = 0.0f64;
    if is_root && ROOT_LCB_ENABLED {
        for edge in stats.children.values() {
            let child = tree.get(edge.id);
            if !rep.can_enter(child.hash) {
                continue;
            }
            max_edge_visits = max_edge_visits.max(edge.edge_visits as f64);
        }
    }

    let mut best: Option<(Move, Arc<Node>)> = None;
    let mut best_puct = f64::NEG_INFINITY;

    for (&mv, edge) in &stats.children {
        let child = tree.get(edge.id);
        if !rep.can_enter(child.hash) {
            continue;
        }

        let edge_visits = edge.edge_visits as f64;
        let vloss = child.virtual_losses.load(Ordering::Relaxed) as f64;
        let child_weight = edge_visits + vloss;

        let (child_visits, child_avg, child_sq_avg) = {
            let cs = child.stats.read();
            (cs.visits as f64, cs.utility_avg, cs.utility_sq_avg)
        };

        let mut q;
        if edge_visits > 0.0 && child_visits > 0.0 {
            q = child_avg;
            if node.next_to_move == Side::Black {
                q = -q;
            }

            if is_root
                && ROOT_LCB_ENABLED
                && max_edge_visits > 0.0
                && edge_visits >= ROOT_LCB_MIN_VISIT_PROP * max_edge_visits
            {
                let variance = (child_sq_avg - child_avg * child_avg).max(0.0);
                q -= ROOT_LCB_STDEVS * (variance / edge_visits.max(1.0)).sqrt();
            }

            if vloss > 0.0 {
                q = (q * edge_visits + (-1.0) * vloss) / child_weight;
            }
            let base = rep.base_count(child.hash);
            if base > 0 {
                q -= REPETITION_PENALTY * base as f64;
            }
        } else {
            q = fpu_value;
        }

        let u = cpuct * edge.prior as f64 * sqrt_visits / (1.0 + child_weight);
        let puct = q + u;
        if puct > best_puct {
            best_puct = puct;
            best = Some((mv, child));
        }
    }
    best
}

/// Expand a node already claimed in the Evaluating state: filter moves,
/// fan out one stage-1 query per distinct origin, attach children with
/// normalised priors, store the network value, and publish.
fn expand_node(
    tree: &Tree,
    node: &Arc<Node>,
    pos: &Position,
    eval: &Evaluation,
    full_filter: bool,
    oracle: &Oracle,
    blunder: &BlunderMemo,
) {
    let moves = movegen::legal(pos, true);
    let moves = if full_filter {
        let moves = filters::filter_lei_locked(pos, moves);
        let moves = filters::filter_urgent_pawn_threat(pos, moves);
        let moves = blunder.filter(pos, &moves);
        vcf::filter_losing_moves(pos, moves, vcf::FILTER_DEPTH)
    } else {
        // Interior nodes only get the cheap lock filter; the heavy expert
        // checks are a root luxury.
        filters::filter_lei_locked(pos, moves)
    };

    if moves.is_empty() {
        node.terminal.store(true, Ordering::Relaxed);
        node.state.store(STATE_EXPANDED, Ordering::Release);
        return;
    }

    let mut groups: HashMap<usize, MoveList> = HashMap::new();
    for &mv in moves.iter() {
        groups.entry(mv.from_sq()).or_default().push(mv);
    }

    // Stage-1 fan-out: one oracle call per origin with a usable prior,
    // joined before any child is attached.
    let stage1: HashMap<usize, Option<Evaluation>> = std::thread::scope(|scope| {
        groups
            .keys()
            .map(|&origin| {
                let skip = eval.policy[origin] <= NEGLIGIBLE_PRIOR;
                scope.spawn(move || {
                    if skip {
                        (origin, None)
                    } else {
                        (
                            origin,
                            oracle.evaluate_stage(pos, StageQuery::Place { origin }).ok(),
                        )
                    }
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().expect("stage-1 expansion thread panicked"))
            .collect()
    });

    struct ChildInfo {
        mv: Move,
        hash: u64,
        prior: f32,
    }
    let mut children_info: Vec<ChildInfo> = Vec::with_capacity(moves.len());
    let mut total_prior = 0.0f32;
    for (&origin, group) in &groups {
        let p_from = eval.policy[origin].max(0.0);
        for &mv in group.iter() {
            let prior = match &stage1[&origin] {
                Some(res1) => p_from * res1.policy[mv.to_sq()].max(0.0),
                None => p_from / group.len() as f32,
            };
            let next = match pos.apply_move(mv) {
                Some(p) => p,
                None => continue,
            };
            total_prior += prior;
            children_info.push(ChildInfo {
                mv,
                hash: next.hash,
                prior,
            });
        }
    }

    if total_prior > 0.0 {
        let inv = 1.0 / total_prior;
        for info in &mut children_info {
            info.prior *= inv;
        }
    }

    let next_side = node.next_to_move.opponent();
    {
        let mut stats = node.stats.write();
        stats.nn_value = (eval.red_win as f64) * 2.0 - 1.0;
        for info in children_info {
            let id = tree.get_or_alloc(info.hash, || Node::new(info.mv, next_side, info.hash));
            stats.children.entry(info.mv).or_insert(ChildEdge {
                id,
                prior: info.prior,
                edge_visits: 0,
            });
        }
    }

    node.state.store(STATE_EXPANDED, Ordering::Release);
}
