//! Position state: the board, the side to move, and the Zobrist hash.
//!
//! A `Position` is a plain value. Applying a move produces a new value and
//! never mutates in place, so search threads can copy freely.

mod attack;
pub mod board;
pub(crate) mod fen;
pub mod zobrist;

pub use board::{col_of, in_palace, index_of, on_board, passed_wall, row_of, Board};
pub use board::{COLS, NUM_SQUARES, ROWS, WALL_ROW};
pub use fen::DecodeError;

use crate::types::{Move, Piece, PieceType, Side};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Position {
    pub board: Board,
    pub side_to_move: Side,
    /// Invariant: equals `zobrist::calculate_hash(&board, side_to_move)`.
    pub hash: u64,
}

impl Position {
    /// The standard starting position, Red to move.
    pub fn initial() -> Position {
        Position::from_parts(board::initial_board(), Side::Red)
    }

    pub fn from_parts(board: Board, side_to_move: Side) -> Position {
        let hash = zobrist::calculate_hash(&board, side_to_move);
        Position {
            board,
            side_to_move,
            hash,
        }
    }

    pub fn decode(text: &str) -> Result<Position, DecodeError> {
        let (board, side) = fen::decode(text)?;
        Ok(Position::from_parts(board, side))
    }

    pub fn encode(&self) -> String {
        fen::encode(&self.board, self.side_to_move)
    }

    #[inline]
    pub fn piece_at(&self, sq: usize) -> Piece {
        self.board.squares[sq]
    }

    /// Applies a move, maintaining the hash incrementally. Returns `None`
    /// for out-of-range squares or when `from` does not hold a piece of the
    /// side to move; legality beyond that is the caller's concern.
    pub fn apply_move(&self, mv: Move) -> Option<Position> {
        if mv.from < 0 || mv.to < 0 {
            return None;
        }
        let (from, to) = (mv.from_sq(), mv.to_sq());
        if from >= NUM_SQUARES || to >= NUM_SQUARES {
            return None;
        }
        let moving = self.board.squares[from];
        if moving.side() != Some(self.side_to_move) {
            return None;
        }

        let mut next = *self;
        let captured = next.board.squares[to];
        next.hash ^= zobrist::piece_key(moving, from);
        if !captured.is_empty() {
            next.hash ^= zobrist::piece_key(captured, to);
        }
        next.hash ^= zobrist::piece_key(moving, to);
        next.hash ^= zobrist::side_key();

        next.board.squares[to] = moving;
        next.board.squares[from] = Piece::EMPTY;
        next.side_to_move = self.side_to_move.opponent();
        Some(next)
    }

    /// Number of pieces on the board, both sides.
    pub fn total_pieces(&self) -> usize {
        self.board.squares.iter().filter(|p| !p.is_empty()).count()
    }

    pub fn count_pieces(&self, side: Side) -> usize {
        self.board
            .squares
            .iter()
            .filter(|p| p.side() == Some(side))
            .count()
    }

    pub fn king_square(&self, side: Side) -> Option<usize> {
        self.board
            .squares
            .iter()
            .position(|p| p.is(side, PieceType::King))
    }

    pub fn king_exists(&self, side: Side) -> bool {
        self.king_square(side).is_some()
    }

    /// Kings on the same column with nothing between them. Illegal to leave
    /// behind; vacuously false once either king is gone.
    pub fn kings_face(&self) -> bool {
        let (red, black) = match (self.king_square(Side::Red), self.king_square(Side::Black)) {
            (Some(r), Some(b)) => (r, b),
            _ => return false,
        };
        if col_of(red) != col_of(black) {
            return false;
        }
        let col = col_of(red);
        let (lo, hi) = (row_of(red).min(row_of(black)), row_of(red).max(row_of(black)));
        ((lo + 1)..hi).all(|r| self.board.squares[index_of(r, col)].is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen;

    #[test]
    fn hash_matches_reference_after_moves() {
        let mut pos = Position::initial();
        // Walk a few plies of generated moves and verify incremental == full.
        for _ in 0..6 {
            let moves = movegen::legal(&pos, false);
            let mv = moves[0];
            pos = pos.apply_move(mv).unwrap();
            assert_eq!(
                pos.hash,
                zobrist::calculate_hash(&pos.board, pos.side_to_move)
            );
        }
    }

    #[test]
    fn hash_differs_by_side_to_move() {
        let pos = Position::initial();
        let flipped = Position::from_parts(pos.board, Side::Black);
        assert_ne!(pos.hash, flipped.hash);
        assert_eq!(pos.hash ^ zobrist::side_key(), flipped.hash);
    }

    #[test]
    fn apply_move_rejects_garbage() {
        let pos = Position::initial();
        assert!(pos.apply_move(Move { from: -1, to: 5 }).is_none());
        assert!(pos.apply_move(Move::new(0, 500)).is_none());
        // Square (6,6) is empty in the initial position.
        assert!(pos.apply_move(Move::new(index_of(6, 6), 0)).is_none());
        // Black piece while Red to move.
        assert!(pos.apply_move(Move::new(index_of(0, 2), index_of(4, 2))).is_none());
    }

    #[test]
    fn kings_face_detection() {
        let pos =
            Position::decode("6e6/13/13/13/13/13/13/13/13/13/13/13/6E6 w").unwrap();
        assert!(pos.kings_face());
        let blocked =
            Position::decode("6e6/13/13/13/13/13/6G6/13/13/13/13/13/6E6 w").unwrap();
        assert!(!blocked.kings_face());
        let offset =
            Position::decode("5e7/13/13/13/13/13/13/13/13/13/13/13/6E6 w").unwrap();
        assert!(!offset.kings_face());
    }

    #[test]
    fn capture_updates_hash_and_count() {
        let pos =
            Position::decode("6e6/13/13/13/13/13/6g6/6A6/13/13/13/13/6E6 w").unwrap();
        let before = pos.total_pieces();
        // Rook takes the pawn directly ahead of it.
        let mv = Move::new(index_of(7, 6), index_of(6, 6));
        let next = pos.apply_move(mv).unwrap();
        assert_eq!(next.total_pieces(), before - 1);
        assert_eq!(
            next.hash,
            zobrist::calculate_hash(&next.board, next.side_to_move)
        );
    }
}
