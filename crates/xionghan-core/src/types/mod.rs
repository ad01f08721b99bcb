//! Core value types shared by every subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side to move. Red moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Red,
    Black,
}

impl Side {
    #[inline]
    pub fn opponent(self) -> Side {
        match self {
            Side::Red => Side::Black,
            Side::Black => Side::Red,
        }
    }

    /// Index into the Zobrist side dimension.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Red => 0,
            Side::Black => 1,
        }
    }

    /// Forward direction for pawns: Red marches toward row 0.
    #[inline]
    pub fn pawn_dir(self) -> i32 {
        match self {
            Side::Red => -1,
            Side::Black => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Red => write!(f, "red"),
            Side::Black => write!(f, "black"),
        }
    }
}

/// Piece kinds, numeric codes 1..=10. Code 0 is reserved for the empty
/// square and never appears in a `PieceType` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i8)]
pub enum PieceType {
    Rook = 1,
    Knight = 2,
    Cannon = 3,
    Elephant = 4,
    Advisor = 5,
    King = 6,
    Pawn = 7,
    Lei = 8,
    Feng = 9,
    Wei = 10,
}

impl PieceType {
    pub const COUNT: usize = 10;

    #[inline]
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i8) -> Option<PieceType> {
        Some(match code {
            1 => PieceType::Rook,
            2 => PieceType::Knight,
            3 => PieceType::Cannon,
            4 => PieceType::Elephant,
            5 => PieceType::Advisor,
            6 => PieceType::King,
            7 => PieceType::Pawn,
            8 => PieceType::Lei,
            9 => PieceType::Feng,
            10 => PieceType::Wei,
            _ => return None,
        })
    }
}

/// A square's contents packed into one signed byte: 0 empty, positive Red,
/// negative Black, magnitude = piece-type code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Piece(pub i8);

impl Piece {
    pub const EMPTY: Piece = Piece(0);

    #[inline]
    pub fn new(side: Side, kind: PieceType) -> Piece {
        match side {
            Side::Red => Piece(kind.code()),
            Side::Black => Piece(-kind.code()),
        }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn side(self) -> Option<Side> {
        match self.0 {
            0 => None,
            n if n > 0 => Some(Side::Red),
            _ => Some(Side::Black),
        }
    }

    #[inline]
    pub fn kind(self) -> Option<PieceType> {
        PieceType::from_code(self.0.abs())
    }

    #[inline]
    pub fn is(self, side: Side, kind: PieceType) -> bool {
        self.side() == Some(side) && self.kind() == Some(kind)
    }
}

/// A from/to square pair. Squares are `row * 13 + col`; capture information
/// is recovered from the pre-move board. `from == to == 0` denotes "no
/// move"; negative squares are reserved for the oracle-failure sentinel on
/// the wire and never index a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Move {
    pub from: i16,
    pub to: i16,
}

impl Move {
    pub const NONE: Move = Move { from: 0, to: 0 };
    /// Reserved response value when inference failed and no fallback exists.
    pub const NN_FAILED: Move = Move { from: -1, to: -1 };

    #[inline]
    pub fn new(from: usize, to: usize) -> Move {
        Move {
            from: from as i16,
            to: to as i16,
        }
    }

    #[inline]
    pub fn from_sq(self) -> usize {
        self.from as usize
    }

    #[inline]
    pub fn to_sq(self) -> usize {
        self.to as usize
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.from == 0 && self.to == 0
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// Score used by the alpha-beta layer, red-centric: positive favours Red.
pub type Score = i32;

/// Effectively infinite score, returned for an immediate king capture.
pub const SCORE_INF: Score = 1_000_000_000;

/// Near-infinite score for a forced connect-check win found at the root.
pub const SCORE_VCF_WIN: Score = 900_000;
