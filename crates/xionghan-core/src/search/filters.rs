//! Stateless tactical move filters.
//!
//! Each takes a candidate list and returns a subset; none ever returns an
//! empty list for a non-empty input (the caller would mis-read that as a
//! terminal position).

use crate::movegen::{self, MoveList};
use crate::position::{Position, COLS};
use crate::types::{PieceType, Side};
use crate::vcf;

/// Lei stay locked while this many pieces remain and their Rook+Knight
/// battery sits untouched.
const LEI_LOCK_MIN_PIECES: usize = 42;

struct LeiLockSetup {
    rook: usize,
    knight: usize,
    lei: usize,
}

const fn sq(row: usize, col: usize) -> usize {
    row * COLS + col
}

const BLACK_LEI_LOCKS: [LeiLockSetup; 2] = [
    LeiLockSetup {
        rook: sq(0, 2),
        knight: sq(1, 3),
        lei: sq(0, 4),
    },
    LeiLockSetup {
        rook: sq(0, 10),
        knight: sq(1, 9),
        lei: sq(0, 8),
    },
];

const RED_LEI_LOCKS: [LeiLockSetup; 2] = [
    LeiLockSetup {
        rook: sq(12, 2),
        knight: sq(11, 3),
        lei: sq(12, 4),
    },
    LeiLockSetup {
        rook: sq(12, 10),
        knight: sq(11, 9),
        lei: sq(12, 8),
    },
];

/// While the opening battery stands, its Lei does not move: the Lei is
/// coordinated with its Rook and Knight and leaves only after they do.
pub fn filter_lei_locked(pos: &Position, moves: MoveList) -> MoveList {
    if moves.len() <= 1 || pos.total_pieces() < LEI_LOCK_MIN_PIECES {
        return moves;
    }
    let side = pos.side_to_move;
    let setups = match side {
        Side::Red => &RED_LEI_LOCKS,
        Side::Black => &BLACK_LEI_LOCKS,
    };

    let locked: Vec<usize> = setups
        .iter()
        .filter(|s| {
            pos.board.squares[s.rook].is(side, PieceType::Rook)
                && pos.board.squares[s.knight].is(side, PieceType::Knight)
        })
        .map(|s| s.lei)
        .collect();
    if locked.is_empty() {
        return moves;
    }

    moves
        .into_iter()
        .filter(|mv| {
            let pc = pos.board.squares[mv.from_sq()];
            !(pc.is(side, PieceType::Lei) && locked.contains(&mv.from_sq()))
        })
        .collect()
}

/// When an enemy pawn bears on one of our Rook/Knight/Cannon/Lei, restrict
/// the candidates to moves from those squares; prefer destinations that
/// are not themselves pawn-covered. Skipped entirely while any king
/// capture or connect-check threat is on the board, where other forces
/// dominate.
pub fn filter_urgent_pawn_threat(pos: &Position, moves: MoveList) -> MoveList {
    if moves.len() <= 1 {
        return moves;
    }
    let side = pos.side_to_move;
    let opp = side.opponent();
    if pos.is_in_check(side) || pos.is_in_check(opp) {
        return moves;
    }

    let threatened = pawn_threatened_squares(pos, side);
    if threatened.is_empty() {
        return moves;
    }

    if can_capture_king_as(pos, side)
        || can_capture_king_as(pos, opp)
        || vcf_threat_as(pos, side)
        || vcf_threat_as(pos, opp)
    {
        return moves;
    }

    let mut forced_safe = MoveList::new();
    let mut forced_any = MoveList::new();
    for &mv in &moves {
        if !threatened.contains(&mv.from_sq()) {
            continue;
        }
        forced_any.push(mv);
        if let Some(next) = pos.apply_move(mv) {
            if !next.is_attacked_by_pawn(mv.to_sq(), opp) {
                forced_safe.push(mv);
            }
        }
    }

    if !forced_safe.is_empty() {
        forced_safe
    } else if !forced_any.is_empty() {
        forced_any
    } else {
        moves
    }
}

/// Squares of our major pieces an enemy pawn can capture next ply.
fn pawn_threatened_squares(pos: &Position, side: Side) -> Vec<usize> {
    let opp_view = Position::from_parts(pos.board, side.opponent());
    let mut out = Vec::new();
    for mv in movegen::legal(&opp_view, false) {
        let attacker = opp_view.board.squares[mv.from_sq()];
        if attacker.kind() != Some(PieceType::Pawn) {
            continue;
        }
        let target = opp_view.board.squares[mv.to_sq()];
        if target.side() != Some(side) {
            continue;
        }
        if matches!(
            target.kind(),
            Some(PieceType::Rook | PieceType::Knight | PieceType::Cannon | PieceType::Lei)
        ) && !out.contains(&mv.to_sq())
        {
            out.push(mv.to_sq());
        }
    }
    out
}

fn can_capture_king_as(pos: &Position, attacker: Side) -> bool {
    let view = if pos.side_to_move == attacker {
        *pos
    } else {
        Position::from_parts(pos.board, attacker)
    };
    movegen::legal(&view, false).iter().any(|mv| {
        let target = view.board.squares[mv.to_sq()];
        target.kind() == Some(PieceType::King) && target.side() != Some(attacker)
    })
}

fn vcf_threat_as(pos: &Position, attacker: Side) -> bool {
    let view = if pos.side_to_move == attacker {
        *pos
    } else {
        Position::from_parts(pos.board, attacker)
    };
    vcf::search(&view, vcf::FILTER_DEPTH).can_win
}
