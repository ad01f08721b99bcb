//! The give-away filter: drops quiet moves that hand a Rook, Cannon,
//! Knight, Lei, or Pawn to the opponent with no recapture, no king
//! capture, and no check in reply.
//!
//! The test costs two nested legal-move generations, so both halves are
//! memoised in fixed-size lock-free tables shared by every worker. A slot
//! packs the key's high bits with a one-byte verdict; a torn or displaced
//! entry fails the tag check and is simply recomputed.

use crate::movegen::{self, MoveList};
use crate::position::Position;
use crate::types::{Move, PieceType};
use std::sync::atomic::{AtomicU64, Ordering};

const MOVE_SALT: u64 = 0x9E37_79B9_7F4A_7C15;
const REPLY_SALT: u64 = 0xC2B2_AE3D_27D4_EB4F;
const MOVE_MIX: u64 = 0x9DDF_EA08_EB38_2D69;
const REPLY_MIX: u64 = 0x517C_C1B7_2722_0A95;

const PRUNE: u8 = 1;
const KEEP: u8 = 2;
const NO_COMPENSATION: u8 = 1;
const HAS_COMPENSATION: u8 = 2;

/// Slots per table; 8 MiB apiece.
const TABLE_BITS: usize = 20;
const TABLE_LEN: usize = 1 << TABLE_BITS;
const TAG_MASK: u64 = !0xFF;

struct TaggedTable {
    slots: Box<[AtomicU64]>,
}

impl TaggedTable {
    fn new() -> TaggedTable {
        let mut v = Vec::with_capacity(TABLE_LEN);
        v.resize_with(TABLE_LEN, || AtomicU64::new(0));
        TaggedTable {
            slots: v.into_boxed_slice(),
        }
    }

    #[inline]
    fn get(&self, key: u64) -> Option<u8> {
        let slot = self.slots[(key as usize) & (TABLE_LEN - 1)].load(Ordering::Relaxed);
        if slot != 0 && (slot & TAG_MASK) == (key & TAG_MASK) {
            Some((slot & 0xFF) as u8)
        } else {
            None
        }
    }

    /// Unconditional overwrite; a lost race costs one recomputation.
    #[inline]
    fn set(&self, key: u64, value: u8) {
        self.slots[(key as usize) & (TABLE_LEN - 1)]
            .store((key & TAG_MASK) | value as u64, Ordering::Relaxed);
    }
}

pub struct BlunderMemo {
    moves: TaggedTable,
    replies: TaggedTable,
}

impl BlunderMemo {
    pub fn new() -> BlunderMemo {
        BlunderMemo {
            moves: TaggedTable::new(),
            replies: TaggedTable::new(),
        }
    }

    /// Filters the candidate list. Returns the input unchanged whenever the
    /// filter would empty it.
    pub fn filter(&self, pos: &Position, moves: &MoveList) -> MoveList {
        if moves.len() <= 1 {
            return moves.clone();
        }
        let safe: MoveList = moves
            .iter()
            .copied()
            .filter(|mv| !self.should_prune(pos, *mv))
            .collect();
        if safe.is_empty() {
            moves.clone()
        } else {
            safe
        }
    }

    fn should_prune(&self, pos: &Position, mv: Move) -> bool {
        let key = move_key(pos.hash, mv);
        if let Some(v) = self.moves.get(key) {
            return v == PRUNE;
        }
        let prune = compute_prune(self, pos, mv);
        self.moves.set(key, if prune { PRUNE } else { KEEP });
        prune
    }

    fn has_recapture_or_check(&self, pos: &Position, target_sq: usize) -> bool {
        let key = reply_key(pos.hash, target_sq);
        if let Some(v) = self.replies.get(key) {
            return v == HAS_COMPENSATION;
        }

        let mut compensated = false;
        for mv in movegen::legal(pos, false) {
            if mv.to_sq() == target_sq {
                let dst = pos.board.squares[target_sq];
                if !dst.is_empty() && dst.side() != Some(pos.side_to_move) {
                    compensated = true;
                    break;
                }
            }
            let target = pos.board.squares[mv.to_sq()];
            if target.kind() == Some(PieceType::King) {
                compensated = true;
                break;
            }
            let after = match pos.apply_move(mv) {
                Some(p) => p,
                None => continue,
            };
            if after.is_in_check(after.side_to_move) {
                compensated = true;
                break;
            }
        }

        self.replies.set(
            key,
            if compensated {
                HAS_COMPENSATION
            } else {
                NO_COMPENSATION
            },
        );
        compensated
    }
}

impl Default for BlunderMemo {
    fn default() -> Self {
        BlunderMemo::new()
    }
}

fn compute_prune(memo: &BlunderMemo, pos: &Position, mv: Move) -> bool {
    let moving = pos.board.squares[mv.from_sq()];
    if moving.side() != Some(pos.side_to_move) {
        return false;
    }
    match moving.kind() {
        Some(
            PieceType::Rook | PieceType::Cannon | PieceType::Knight | PieceType::Lei | PieceType::Pawn,
        ) => {}
        _ => return false,
    }
    // Captures buy something; out of scope here.
    if !pos.board.squares[mv.to_sq()].is_empty() {
        return false;
    }

    let next = match pos.apply_move(mv) {
        Some(p) => p,
        None => return false,
    };
    // Checking moves force the opponent's hand instead.
    if next.is_in_check(next.side_to_move) {
        return false;
    }

    for reply in movegen::legal(&next, false) {
        if reply.to_sq() != mv.to_sq() {
            continue;
        }
        let attacker = next.board.squares[reply.from_sq()];
        if attacker.side() != Some(next.side_to_move) {
            continue;
        }
        let after = match next.apply_move(reply) {
            Some(p) => p,
            None => continue,
        };
        // One uncompensated recapture branch is enough to call it a
        // give-away.
        if !memo.has_recapture_or_check(&after, mv.to_sq()) {
            return true;
        }
    }
    false
}

fn move_key(hash: u64, mv: Move) -> u64 {
    let move_bits = ((mv.from as u16 as u64) << 16) | (mv.to as u16 as u64);
    hash ^ MOVE_SALT ^ move_bits.wrapping_mul(MOVE_MIX)
}

fn reply_key(hash: u64, sq: usize) -> u64 {
    hash ^ REPLY_SALT ^ ((sq as u64 + 1).wrapping_mul(REPLY_MIX))
}
