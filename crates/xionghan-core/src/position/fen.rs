//! FEN-style position encoding.
//!
//! Thirteen rank records separated by `/`, rank 0 (Black's back rank)
//! first. Letters are pieces (upper case Red), `.` a single empty square,
//! and a decimal number a run of empty squares. A trailing ` w` or ` b`
//! gives the side to move.

use super::board::{index_of, Board, COLS, ROWS};
use crate::types::{Piece, PieceType, Side};
use std::error::Error;
use std::fmt;

/// Errors from [`Position::decode`](super::Position::decode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Missing board or side-to-move field.
    MissingField,
    /// Wrong number of rank records.
    RankCount(usize),
    /// A rank did not describe exactly 13 columns.
    RankWidth { rank: usize, cols: usize },
    /// A character that is neither a piece letter, a digit, nor `.`.
    BadPieceChar(char),
    /// Side-to-move field was not `w` or `b`.
    BadSideToMove(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingField => write!(f, "position string needs board and side fields"),
            DecodeError::RankCount(n) => write!(f, "expected {ROWS} ranks, got {n}"),
            DecodeError::RankWidth { rank, cols } => {
                write!(f, "rank {rank} describes {cols} columns, expected {COLS}")
            }
            DecodeError::BadPieceChar(c) => write!(f, "unknown piece character {c:?}"),
            DecodeError::BadSideToMove(s) => write!(f, "side to move must be 'w' or 'b', got {s:?}"),
        }
    }
}

impl Error for DecodeError {}

pub(super) fn letter_to_piece_type(ch: char) -> Option<PieceType> {
    Some(match ch {
        'a' => PieceType::Rook,
        'b' => PieceType::Knight,
        'c' => PieceType::Elephant,
        'd' => PieceType::Advisor,
        'e' => PieceType::King,
        'f' => PieceType::Cannon,
        'g' => PieceType::Pawn,
        'h' => PieceType::Lei,
        'i' => PieceType::Feng,
        'j' => PieceType::Wei,
        _ => return None,
    })
}

fn piece_type_to_letter(kind: PieceType) -> char {
    match kind {
        PieceType::Rook => 'a',
        PieceType::Knight => 'b',
        PieceType::Elephant => 'c',
        PieceType::Advisor => 'd',
        PieceType::King => 'e',
        PieceType::Cannon => 'f',
        PieceType::Pawn => 'g',
        PieceType::Lei => 'h',
        PieceType::Feng => 'i',
        PieceType::Wei => 'j',
    }
}

pub(crate) fn piece_to_char(pc: Piece) -> Option<char> {
    let kind = pc.kind()?;
    let base = piece_type_to_letter(kind);
    match pc.side()? {
        Side::Red => Some(base.to_ascii_uppercase()),
        Side::Black => Some(base),
    }
}

pub(super) fn encode(board: &Board, side_to_move: Side) -> String {
    let mut out = String::with_capacity(ROWS * (COLS + 1) + 2);
    for r in 0..ROWS {
        if r > 0 {
            out.push('/');
        }
        let mut empty = 0usize;
        for c in 0..COLS {
            let pc = board.squares[index_of(r, c)];
            match piece_to_char(pc) {
                None => empty += 1,
                Some(ch) => {
                    if empty > 0 {
                        out.push_str(&empty.to_string());
                        empty = 0;
                    }
                    out.push(ch);
                }
            }
        }
        if empty > 0 {
            out.push_str(&empty.to_string());
        }
    }
    out.push(' ');
    out.push(match side_to_move {
        Side::Red => 'w',
        Side::Black => 'b',
    });
    out
}

pub(super) fn decode(text: &str) -> Result<(Board, Side), DecodeError> {
    let mut parts = text.split_whitespace();
    let board_field = parts.next().ok_or(DecodeError::MissingField)?;
    let side_field = parts.next().ok_or(DecodeError::MissingField)?;

    let ranks: Vec<&str> = board_field.split('/').collect();
    if ranks.len() != ROWS {
        return Err(DecodeError::RankCount(ranks.len()));
    }

    let mut board = Board::EMPTY;
    for (r, rank) in ranks.iter().enumerate() {
        let mut c = 0usize;
        let mut run = 0usize;
        for ch in rank.chars() {
            if let Some(d) = ch.to_digit(10) {
                run = run * 10 + d as usize;
                continue;
            }
            c += std::mem::take(&mut run);
            if c >= COLS {
                return Err(DecodeError::RankWidth { rank: r, cols: c + 1 });
            }
            if ch == '.' {
                c += 1;
                continue;
            }
            let kind =
                letter_to_piece_type(ch.to_ascii_lowercase()).ok_or(DecodeError::BadPieceChar(ch))?;
            let side = if ch.is_ascii_uppercase() {
                Side::Red
            } else {
                Side::Black
            };
            board.squares[index_of(r, c)] = Piece::new(side, kind);
            c += 1;
        }
        c += run;
        if c != COLS {
            return Err(DecodeError::RankWidth { rank: r, cols: c });
        }
    }

    let side = match side_field {
        "w" => Side::Red,
        "b" => Side::Black,
        other => return Err(DecodeError::BadSideToMove(other.to_string())),
    };
    Ok((board, side))
}
