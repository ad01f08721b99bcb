//! Attack and check queries, answered by move simulation: a square is
//! attacked if some enemy piece could land on it in one ply.

use super::board::{col_of, on_board, passed_wall, row_of, COLS, ROWS};
use super::Position;
use crate::movegen;
use crate::types::{PieceType, Side};

impl Position {
    /// Could any piece of `by_side` move onto `sq` right now?
    ///
    /// Pieces that can never deliver check are skipped, as are Pawn,
    /// Knight, and Lei still on their own half: none of their moves reach
    /// across the wall.
    pub fn is_attacked(&self, sq: usize, by_side: Side) -> bool {
        let mut scratch = movegen::MoveList::new();
        for s in 0..super::NUM_SQUARES {
            let pc = self.board.squares[s];
            if pc.side() != Some(by_side) {
                continue;
            }
            let kind = match pc.kind() {
                Some(k) => k,
                None => continue,
            };
            match kind {
                PieceType::Elephant | PieceType::Advisor | PieceType::Wei => continue,
                PieceType::Pawn | PieceType::Knight | PieceType::Lei
                    if !passed_wall(by_side, row_of(s)) =>
                {
                    continue;
                }
                _ => {}
            }
            scratch.clear();
            movegen::piece_moves_into(self, s, kind, &mut scratch);
            if scratch.iter().any(|mv| mv.to_sq() == sq) {
                return true;
            }
        }
        false
    }

    /// Whether `side`'s King is currently attacked. A side with no King is
    /// never "in check"; the game is already decided.
    pub fn is_in_check(&self, side: Side) -> bool {
        match self.king_square(side) {
            Some(king) => self.is_attacked(king, side.opponent()),
            None => false,
        }
    }

    /// Fast pawn-only attack test used by the heuristic move filters: a
    /// pawn one step behind `sq`, or beside it once that rank counts as
    /// past the wall for `by_side`.
    pub fn is_attacked_by_pawn(&self, sq: usize, by_side: Side) -> bool {
        let (r, c) = (row_of(sq) as i32, col_of(sq) as i32);
        let dir = by_side.pawn_dir();
        let pawn_at = |pr: i32, pc: i32| {
            on_board(pr, pc)
                && self.board.squares[(pr as usize) * COLS + pc as usize]
                    .is(by_side, PieceType::Pawn)
        };
        if pawn_at(r - dir, c) {
            return true;
        }
        if (0..ROWS as i32).contains(&r) && passed_wall(by_side, r as usize) {
            return pawn_at(r, c - 1) || pawn_at(r, c + 1);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::index_of;
    use crate::types::Move;

    #[test]
    fn rook_gives_check_down_a_file() {
        // Red rook on the black king's file with a clear path.
        let pos = Position::decode("6e6/13/13/13/13/13/13/13/6A6/13/13/13/6E6 w").unwrap();
        assert!(pos.is_in_check(Side::Black));
        assert!(!pos.is_in_check(Side::Red));
    }

    #[test]
    fn check_equivalence_with_attack() {
        let pos = Position::initial();
        for side in [Side::Red, Side::Black] {
            let king = pos.king_square(side).unwrap();
            assert_eq!(
                pos.is_in_check(side),
                pos.is_attacked(king, side.opponent())
            );
        }
        assert!(!pos.is_in_check(Side::Red));
        assert!(!pos.is_in_check(Side::Black));
    }

    #[test]
    fn missing_king_is_not_in_check() {
        let pos = Position::decode("13/13/13/13/13/13/13/13/13/13/13/13/4E8 w").unwrap();
        assert!(!pos.is_in_check(Side::Black));
    }

    #[test]
    fn pawn_attack_before_and_after_wall() {
        // Red pawn at (6,6) has not passed the wall: attacks only forward.
        let pos =
            Position::decode("6e6/13/13/13/13/13/6G6/13/13/13/13/13/6E6 w").unwrap();
        assert!(pos.is_attacked_by_pawn(index_of(5, 6), Side::Red));
        assert!(!pos.is_attacked_by_pawn(index_of(6, 5), Side::Red));

        // Once past the wall it also covers the two side squares.
        let passed = pos
            .apply_move(Move::new(index_of(6, 6), index_of(5, 6)))
            .unwrap();
        assert!(passed.is_attacked_by_pawn(index_of(5, 5), Side::Red));
        assert!(passed.is_attacked_by_pawn(index_of(5, 7), Side::Red));
        assert!(passed.is_attacked_by_pawn(index_of(4, 6), Side::Red));
    }
}
