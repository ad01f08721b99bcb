//! Move generation.
//!
//! `pseudo_legal` applies only the per-piece rules. `legal` additionally
//! rejects king-facing positions, and in strict (search) mode a set of
//! heuristic filters that keep the tree free of opening nonsense and
//! one-move give-aways. A move that captures the enemy King bypasses every
//! filter: it ends the game.

mod generator;
pub mod tables;

pub(crate) use generator::piece_moves_into;

use crate::position::{row_of, Position};
use crate::types::{Move, PieceType, Side};
use smallvec::SmallVec;

pub type MoveList = SmallVec<[Move; 64]>;

/// Piece count at or above which King/Advisor moves are banned outside of
/// check: the opening phase.
const OPENING_PIECES: usize = 44;
/// Above this, long-range pieces may not retreat and quiet moves may not
/// land on attacked squares.
const NO_RETREAT_PIECES: usize = 42;
/// Above this, major pieces may not step onto pawn-covered squares for
/// less than a minor-piece capture.
const PAWN_TRADE_PIECES: usize = 30;

/// Every move the side to move can produce under the per-piece rules,
/// ignoring self-check and king-facing.
pub fn pseudo_legal(pos: &Position) -> MoveList {
    let side = pos.side_to_move;
    let mut out = MoveList::new();
    for sq in 0..crate::position::NUM_SQUARES {
        let pc = pos.board.squares[sq];
        if pc.side() != Some(side) {
            continue;
        }
        if let Some(kind) = pc.kind() {
            piece_moves_into(pos, sq, kind, &mut out);
        }
    }
    out
}

/// Legal moves. With `strict` the heuristic search filters apply; if they
/// leave nothing, the permissive rules are retried so an unusual but
/// playable position is never reported as terminal.
pub fn legal(pos: &Position, strict: bool) -> MoveList {
    let pseudo = pseudo_legal(pos);
    let side = pos.side_to_move;
    let opp = side.opponent();

    let (total, mine, in_check) = if strict {
        (
            pos.total_pieces(),
            pos.count_pieces(side),
            pos.is_in_check(side),
        )
    } else {
        (0, 0, false)
    };

    let mut out = MoveList::new();
    for &mv in &pseudo {
        let target = pos.board.squares[mv.to_sq()];
        // Capturing the enemy King is the terminal action; nothing may
        // filter it.
        if target.kind() == Some(PieceType::King) {
            out.push(mv);
            continue;
        }

        let next = match pos.apply_move(mv) {
            Some(p) => p,
            None => continue,
        };
        if next.kings_face() {
            continue;
        }

        if strict {
            let kind = match pos.board.squares[mv.from_sq()].kind() {
                Some(k) => k,
                None => continue,
            };

            if total >= OPENING_PIECES
                && !in_check
                && matches!(kind, PieceType::King | PieceType::Advisor)
            {
                continue;
            }

            // Moving into check loses on the spot; tolerated only for a
            // bare king that has nothing left to shelter behind.
            if mine > 1 && next.is_in_check(side) {
                continue;
            }

            if total > NO_RETREAT_PIECES {
                if is_long_range(kind) && is_backward(side, mv) {
                    continue;
                }
                if target.is_empty() && next.is_attacked(mv.to_sq(), opp) {
                    continue;
                }
            }

            if total > PAWN_TRADE_PIECES
                && matches!(
                    kind,
                    PieceType::Rook
                        | PieceType::Cannon
                        | PieceType::Knight
                        | PieceType::Lei
                        | PieceType::Pawn
                )
                && next.is_attacked_by_pawn(mv.to_sq(), opp)
            {
                // Feeding a piece to a pawn is only acceptable when the
                // move itself wins more than a Pawn/Wei/Feng.
                match target.kind() {
                    None => continue,
                    Some(PieceType::Pawn) | Some(PieceType::Wei) | Some(PieceType::Feng) => {
                        continue
                    }
                    _ => {}
                }
            }
        }

        out.push(mv);
    }

    if strict && out.is_empty() {
        return legal(pos, false);
    }
    out
}

#[inline]
fn is_long_range(kind: PieceType) -> bool {
    matches!(
        kind,
        PieceType::Rook | PieceType::Cannon | PieceType::Knight | PieceType::Lei
    )
}

/// Toward the mover's own back rank.
#[inline]
fn is_backward(side: Side, mv: Move) -> bool {
    let (from_row, to_row) = (row_of(mv.from_sq()), row_of(mv.to_sq()));
    match side {
        Side::Red => to_row > from_row,
        Side::Black => to_row < from_row,
    }
}
