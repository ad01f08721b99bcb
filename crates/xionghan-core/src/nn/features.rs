//! Tensor encoding of a position, from the moving side's perspective.
//!
//! 25 spatial planes of 13x13 plus 19 global scalars. When Black is to
//! move the board is flipped vertically before encoding and the returned
//! policy is flipped back, so the network always sees itself as the side
//! marching upward.

use super::oracle::StageQuery;
use crate::movegen;
use crate::position::{Position, NUM_SQUARES};
use crate::types::Side;

pub const BOARD_SIZE: usize = 13;
pub const PLANE_SIZE: usize = BOARD_SIZE * BOARD_SIZE;
pub const BIN_CHANNELS: usize = 25;
pub const GLOBAL_FEATURES: usize = 19;
/// 169 squares plus the pass slot.
pub const POLICY_SIZE: usize = PLANE_SIZE + 1;
pub const VALUE_SIZE: usize = 3;
pub const MAX_BATCH_SIZE: usize = 64;

const PLANE_ON_BOARD: usize = 0;
/// Own pieces occupy planes 1..=10 by type code, opponents 12..=21.
const OPPONENT_PLANE_OFFSET: usize = 11;
const PLANE_CHOSEN_ORIGIN: usize = 23;
const PLANE_ONLY_MOVE: usize = 24;

const GLOBAL_NEXT_IS_BLACK: usize = 0;
const GLOBAL_STAGE: usize = 1;
const GLOBAL_RESULTS_INITED: usize = 2;
const GLOBAL_WINNER_DRAW: usize = 3;
const GLOBAL_WINNER_NEXT: usize = 4;
const GLOBAL_WINNER_OPP: usize = 5;
const GLOBAL_ONLY_MOVE_PASS: usize = 6;
const GLOBAL_PARITY_X: usize = 7;
const GLOBAL_PARITY_Y: usize = 8;

#[inline]
pub(super) fn map_square(sq: usize, flip_y: bool) -> usize {
    if !flip_y {
        return sq;
    }
    let (r, c) = (sq / BOARD_SIZE, sq % BOARD_SIZE);
    (BOARD_SIZE - 1 - r) * BOARD_SIZE + c
}

/// Undo the vertical flip on a policy head read back for Black.
pub(super) fn unflip_policy(raw: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; POLICY_SIZE];
    for (sq, slot) in out.iter_mut().enumerate().take(PLANE_SIZE) {
        *slot = raw[map_square(sq, true)];
    }
    out[POLICY_SIZE - 1] = raw[POLICY_SIZE - 1];
    out
}

/// Pre-inference terminal summary fed to the global head.
struct ResultsSummary {
    winner_opp: bool,
    only_origin: Option<usize>,
}

fn summarize(pos: &Position, stage: StageQuery) -> ResultsSummary {
    let legal = movegen::legal(pos, false);
    match stage {
        StageQuery::Choose => {
            let mut seen = [false; NUM_SQUARES];
            let mut origins = 0usize;
            let mut last = 0usize;
            for mv in &legal {
                let from = mv.from_sq();
                if !seen[from] {
                    seen[from] = true;
                    origins += 1;
                    last = from;
                }
            }
            ResultsSummary {
                // No origin to choose: the side to move has already lost.
                winner_opp: origins == 0,
                only_origin: (origins == 1).then_some(last),
            }
        }
        StageQuery::Place { origin } => {
            let mut dests = legal.iter().filter(|mv| mv.from_sq() == origin);
            let first = dests.next().map(|mv| mv.to_sq());
            let rest = dests.next();
            ResultsSummary {
                winner_opp: false,
                only_origin: match (first, rest) {
                    (Some(to), None) => Some(to),
                    _ => None,
                },
            }
        }
    }
}

/// Fill one sample's worth of the input tensors. Both slices must already
/// be zeroed.
pub(super) fn encode_into(pos: &Position, stage: StageQuery, bin: &mut [f32], global: &mut [f32]) {
    debug_assert_eq!(bin.len(), BIN_CHANNELS * PLANE_SIZE);
    debug_assert_eq!(global.len(), GLOBAL_FEATURES);

    let to_move = pos.side_to_move;
    let flip_y = to_move == Side::Black;

    for slot in bin[PLANE_ON_BOARD * PLANE_SIZE..(PLANE_ON_BOARD + 1) * PLANE_SIZE].iter_mut() {
        *slot = 1.0;
    }

    for sq in 0..NUM_SQUARES {
        let pc = pos.board.squares[sq];
        let (side, kind) = match (pc.side(), pc.kind()) {
            (Some(s), Some(k)) => (s, k),
            _ => continue,
        };
        let plane = if side == to_move {
            kind.code() as usize
        } else {
            kind.code() as usize + OPPONENT_PLANE_OFFSET
        };
        bin[plane * PLANE_SIZE + map_square(sq, flip_y)] = 1.0;
    }

    if let StageQuery::Place { origin } = stage {
        if origin < PLANE_SIZE {
            bin[PLANE_CHOSEN_ORIGIN * PLANE_SIZE + map_square(origin, flip_y)] = 1.0;
        }
    }

    if to_move == Side::Black {
        global[GLOBAL_NEXT_IS_BLACK] = 1.0;
    }
    global[GLOBAL_STAGE] = match stage {
        StageQuery::Choose => 0.0,
        StageQuery::Place { .. } => 1.0,
    };
    global[GLOBAL_RESULTS_INITED] = 1.0;

    let summary = summarize(pos, stage);
    // Draw and next-player-wins are never pre-announced here; the slots
    // exist for the training-time encoder.
    global[GLOBAL_WINNER_DRAW] = 0.0;
    global[GLOBAL_WINNER_NEXT] = 0.0;
    if summary.winner_opp {
        global[GLOBAL_WINNER_OPP] = 1.0;
    }
    match summary.only_origin {
        Some(sq) if sq < PLANE_SIZE => {
            bin[PLANE_ONLY_MOVE * PLANE_SIZE + map_square(sq, flip_y)] = 1.0;
        }
        Some(_) => global[GLOBAL_ONLY_MOVE_PASS] = 1.0,
        None => {}
    }

    // Odd board dimensions.
    if BOARD_SIZE % 2 != 0 {
        global[GLOBAL_PARITY_X] = 1.0;
        global[GLOBAL_PARITY_Y] = 1.0;
    }
}

/// Legal slots for the policy mask at the given stage.
pub(super) fn legal_mask(pos: &Position, stage: StageQuery) -> ([bool; POLICY_SIZE], usize) {
    let mut mask = [false; POLICY_SIZE];
    let mut count = 0usize;
    let legal = movegen::legal(pos, false);
    match stage {
        StageQuery::Choose => {
            for mv in &legal {
                let from = mv.from_sq();
                if !mask[from] {
                    mask[from] = true;
                    count += 1;
                }
            }
        }
        StageQuery::Place { origin } => {
            for mv in &legal {
                if mv.from_sq() == origin && !mask[mv.to_sq()] {
                    mask[mv.to_sq()] = true;
                    count += 1;
                }
            }
        }
    }
    (mask, count)
}
