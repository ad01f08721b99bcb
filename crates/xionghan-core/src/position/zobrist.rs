//! Zobrist keys.
//!
//! The table is generated at compile time by a splitmix64 stream from a
//! fixed seed, so hashes are identical across processes and runs; any
//! persisted cache keyed on them stays valid.

use super::board::NUM_SQUARES;
use crate::types::{Piece, Side};

/// Piece-type dimension: codes 1..=10, slot 0 unused.
const PIECE_TYPES: usize = 11;

pub struct ZobristKeys {
    /// `pieces[side][type][square]`
    pieces: [[[u64; NUM_SQUARES]; PIECE_TYPES]; 2],
    /// XORed in when Black is to move.
    side: u64,
}

const SPLITMIX_GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(SPLITMIX_GOLDEN);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl ZobristKeys {
    const fn init() -> Self {
        let mut keys = ZobristKeys {
            pieces: [[[0; NUM_SQUARES]; PIECE_TYPES]; 2],
            side: 0,
        };
        let mut state = SPLITMIX_GOLDEN;

        let mut side = 0;
        while side < 2 {
            let mut pt = 1;
            while pt < PIECE_TYPES {
                let mut sq = 0;
                while sq < NUM_SQUARES {
                    keys.pieces[side][pt][sq] = splitmix64(&mut state);
                    sq += 1;
                }
                pt += 1;
            }
            side += 1;
        }
        keys.side = splitmix64(&mut state);
        keys
    }
}

pub static ZOBRIST: ZobristKeys = ZobristKeys::init();

/// Key for a piece on a square; zero for the empty piece.
#[inline]
pub fn piece_key(pc: Piece, sq: usize) -> u64 {
    let (side, kind) = match (pc.side(), pc.kind()) {
        (Some(s), Some(k)) => (s, k),
        _ => return 0,
    };
    ZOBRIST.pieces[side.index()][kind.code() as usize][sq]
}

#[inline]
pub fn side_key() -> u64 {
    ZOBRIST.side
}

/// Full recomputation from a board and side to move. `Position` keeps its
/// hash up to date incrementally; this is the reference definition.
pub fn calculate_hash(board: &super::board::Board, side_to_move: Side) -> u64 {
    let mut h = 0u64;
    for (sq, pc) in board.squares.iter().enumerate() {
        if !pc.is_empty() {
            h ^= piece_key(*pc, sq);
        }
    }
    if side_to_move == Side::Black {
        h ^= ZOBRIST.side;
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PieceType;

    #[test]
    fn keys_are_distinct() {
        assert_ne!(ZOBRIST.side, 0);
        let a = piece_key(Piece::new(Side::Red, PieceType::Pawn), 0);
        let b = piece_key(Piece::new(Side::Red, PieceType::Pawn), 1);
        let c = piece_key(Piece::new(Side::Black, PieceType::Pawn), 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(piece_key(Piece::EMPTY, 0), 0);
    }

    #[test]
    fn xor_is_involutive() {
        let a = piece_key(Piece::new(Side::Red, PieceType::Rook), 42);
        let b = piece_key(Piece::new(Side::Black, PieceType::Lei), 42);
        let combined = a ^ b;
        assert_eq!(combined ^ b, a);
        assert_eq!(combined ^ a, b);
    }

    #[test]
    fn stream_is_stable() {
        // Guard against accidental reseeding: the first generated key is a
        // fixed function of the seed.
        let mut state = SPLITMIX_GOLDEN;
        let first = splitmix64(&mut state);
        assert_eq!(
            ZOBRIST.pieces[0][1][0], first,
            "zobrist stream no longer matches the fixed seed"
        );
    }
}
