//! Per-piece pseudo-legal move generation.
//!
//! Every generator pushes destination squares that are empty or hold an
//! enemy piece; self-check and king-facing constraints are applied later by
//! the legal-move layer.

use super::tables::{DIAG_DIRS, FENG_TRACK, LEI_RING, ROOK_DIRS};
use super::MoveList;
use crate::position::{col_of, in_palace, index_of, on_board, passed_wall, row_of, Position};
use crate::types::{Move, PieceType, Side};

/// Knight leaps with their blocking "horse-leg" square.
const KNIGHT_LEAPS: [(i32, i32, i32, i32); 8] = [
    (-2, -1, -1, 0),
    (-2, 1, -1, 0),
    (-1, -2, 0, -1),
    (-1, 2, 0, 1),
    (1, -2, 0, -1),
    (1, 2, 0, 1),
    (2, -1, 1, 0),
    (2, 1, 1, 0),
];

pub(crate) fn piece_moves_into(pos: &Position, from: usize, kind: PieceType, out: &mut MoveList) {
    match kind {
        PieceType::Rook => rook_moves(pos, from, out),
        PieceType::Cannon => cannon_moves(pos, from, out),
        PieceType::Knight => knight_moves(pos, from, out),
        PieceType::Elephant => elephant_moves(pos, from, out),
        PieceType::Advisor => advisor_moves(pos, from, out),
        PieceType::King => king_moves(pos, from, out),
        PieceType::Pawn => pawn_moves(pos, from, out),
        PieceType::Lei => lei_moves(pos, from, out),
        PieceType::Feng => feng_moves(pos, from, out),
        PieceType::Wei => wei_moves(pos, from, out),
    }
}

#[inline]
fn push_if_vacant_or_enemy(pos: &Position, side: Side, from: usize, to: usize, out: &mut MoveList) {
    let dst = pos.board.squares[to];
    if dst.is_empty() || dst.side() != Some(side) {
        out.push(Move::new(from, to));
    }
}

fn side_of(pos: &Position, from: usize) -> Side {
    pos.board.squares[from]
        .side()
        .expect("generator called on an occupied square")
}

/// Rook: orthogonal slide, capture the first enemy on the line.
fn rook_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);
    for (dr, dc) in ROOK_DIRS {
        let (mut r, mut c) = (row + dr, col + dc);
        while on_board(r, c) {
            let to = index_of(r as usize, c as usize);
            let dst = pos.board.squares[to];
            if dst.is_empty() {
                out.push(Move::new(from, to));
            } else {
                if dst.side() != Some(side) {
                    out.push(Move::new(from, to));
                }
                break;
            }
            r += dr;
            c += dc;
        }
    }
}

/// Cannon: slides on empty squares; captures by jumping exactly one screen.
fn cannon_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);
    for (dr, dc) in ROOK_DIRS {
        let (mut r, mut c) = (row + dr, col + dc);
        // Quiet phase: up to and including the screen square.
        while on_board(r, c) {
            let to = index_of(r as usize, c as usize);
            if pos.board.squares[to].is_empty() {
                out.push(Move::new(from, to));
                r += dr;
                c += dc;
            } else {
                r += dr;
                c += dc;
                break;
            }
        }
        // Capture phase: first piece beyond the screen.
        while on_board(r, c) {
            let to = index_of(r as usize, c as usize);
            let dst = pos.board.squares[to];
            if !dst.is_empty() {
                if dst.side() != Some(side) {
                    out.push(Move::new(from, to));
                }
                break;
            }
            r += dr;
            c += dc;
        }
    }
}

/// Knight: eight leg-blocked leaps plus the straight-three jump over two
/// empty squares.
fn knight_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);

    for (dr, dc, lr, lc) in KNIGHT_LEAPS {
        let (r, c) = (row + dr, col + dc);
        if !on_board(r, c) {
            continue;
        }
        let leg = index_of((row + lr) as usize, (col + lc) as usize);
        if !pos.board.squares[leg].is_empty() {
            continue;
        }
        push_if_vacant_or_enemy(pos, side, from, index_of(r as usize, c as usize), out);
    }

    for (dr, dc) in ROOK_DIRS {
        let (r3, c3) = (row + 3 * dr, col + 3 * dc);
        if !on_board(r3, c3) {
            continue;
        }
        let mid1 = index_of((row + dr) as usize, (col + dc) as usize);
        let mid2 = index_of((row + 2 * dr) as usize, (col + 2 * dc) as usize);
        if !pos.board.squares[mid1].is_empty() || !pos.board.squares[mid2].is_empty() {
            continue;
        }
        push_if_vacant_or_enemy(pos, side, from, index_of(r3 as usize, c3 as usize), out);
    }
}

/// Elephant: two-step diagonal, blocked at the eye, never across the wall.
fn elephant_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);
    for (dr, dc) in DIAG_DIRS {
        let (r, c) = (row + 2 * dr, col + 2 * dc);
        if !on_board(r, c) {
            continue;
        }
        let eye = index_of((row + dr) as usize, (col + dc) as usize);
        if !pos.board.squares[eye].is_empty() {
            continue;
        }
        if passed_wall(side, r as usize) {
            continue;
        }
        push_if_vacant_or_enemy(pos, side, from, index_of(r as usize, c as usize), out);
    }
}

/// Advisor: one diagonal step inside the palace.
fn advisor_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);
    for (dr, dc) in DIAG_DIRS {
        let (r, c) = (row + dr, col + dc);
        if !on_board(r, c) || !in_palace(side, r as usize, c as usize) {
            continue;
        }
        push_if_vacant_or_enemy(pos, side, from, index_of(r as usize, c as usize), out);
    }
}

/// King: one orthogonal step inside the palace.
fn king_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);
    for (dr, dc) in ROOK_DIRS {
        let (r, c) = (row + dr, col + dc);
        if !on_board(r, c) || !in_palace(side, r as usize, c as usize) {
            continue;
        }
        push_if_vacant_or_enemy(pos, side, from, index_of(r as usize, c as usize), out);
    }
}

/// Pawn. Before the wall: one forward step (the only square it may capture
/// on) or a forward slide through empty squares, ending no later than the
/// first square on the enemy side. After the wall: one step forward or
/// sideways, capturing on any of them.
fn pawn_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);
    let dir = side.pawn_dir();

    if passed_wall(side, row as usize) {
        for (r, c) in [(row + dir, col), (row, col - 1), (row, col + 1)] {
            if on_board(r, c) {
                push_if_vacant_or_enemy(pos, side, from, index_of(r as usize, c as usize), out);
            }
        }
        return;
    }

    let mut first_step = true;
    let mut r = row + dir;
    while on_board(r, col) {
        let to = index_of(r as usize, col as usize);
        let dst = pos.board.squares[to];
        if dst.is_empty() {
            out.push(Move::new(from, to));
        } else {
            if first_step && dst.side() != Some(side) {
                out.push(Move::new(from, to));
            }
            break;
        }
        // The first enemy-side square ends the slide.
        if passed_wall(side, r as usize) {
            break;
        }
        first_step = false;
        r += dir;
    }
}

/// Lei: slides like a queen but only onto empty squares; captures only an
/// adjacent enemy whose two ring-neighbour squares are both empty.
fn lei_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);

    for (dr, dc) in ROOK_DIRS.iter().chain(DIAG_DIRS.iter()) {
        let (mut r, mut c) = (row + dr, col + dc);
        while on_board(r, c) {
            let to = index_of(r as usize, c as usize);
            if !pos.board.squares[to].is_empty() {
                break;
            }
            out.push(Move::new(from, to));
            r += dr;
            c += dc;
        }
    }

    for target in &LEI_RING[from] {
        let dst = pos.board.squares[target.to];
        if dst.is_empty() || dst.side() == Some(side) {
            continue;
        }
        let lone = target
            .legs
            .iter()
            .all(|leg| pos.board.squares[*leg].is_empty());
        if lone {
            out.push(Move::new(from, target.to));
        }
    }
}

/// Feng: confined to the track; a run stops at any piece and at any
/// station; captures the first enemy on the run only when departing from a
/// station.
fn feng_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let track = &*FENG_TRACK;
    if !track.road[from] {
        return;
    }
    let side = side_of(pos, from);
    let can_capture = track.stations[from];
    for run in &track.lines[from] {
        for &to in run {
            let dst = pos.board.squares[to];
            if dst.is_empty() {
                out.push(Move::new(from, to));
            } else {
                if can_capture && dst.side() != Some(side) {
                    out.push(Move::new(from, to));
                }
                break;
            }
            if track.stations[to] {
                break;
            }
        }
    }
}

/// Wei: slides an even number of columns along its row onto an empty
/// square; captures exactly two columns away over an empty middle square.
fn wei_moves(pos: &Position, from: usize, out: &mut MoveList) {
    let side = side_of(pos, from);
    let (row, col) = (row_of(from) as i32, col_of(from) as i32);

    for dc in [-1i32, 1] {
        let mut step = 2;
        loop {
            let c2 = col + dc * step;
            if !on_board(row, c2) {
                break;
            }
            let mut blocked = false;
            let mut mid = col + dc;
            while mid != c2 {
                if !pos.board.squares[index_of(row as usize, mid as usize)].is_empty() {
                    blocked = true;
                    break;
                }
                mid += dc;
            }
            if blocked {
                break;
            }
            let to = index_of(row as usize, c2 as usize);
            if !pos.board.squares[to].is_empty() {
                break;
            }
            out.push(Move::new(from, to));
            step += 2;
        }
    }

    for dc in [-1i32, 1] {
        let (mc, tc) = (col + dc, col + 2 * dc);
        if !on_board(row, tc) || !on_board(row, mc) {
            continue;
        }
        if !pos.board.squares[index_of(row as usize, mc as usize)].is_empty() {
            continue;
        }
        let to = index_of(row as usize, tc as usize);
        let dst = pos.board.squares[to];
        if !dst.is_empty() && dst.side() != Some(side) {
            out.push(Move::new(from, to));
        }
    }
}
