//! Precomputed movement tables for the Lei ring and the Feng track.

use crate::position::{col_of, index_of, on_board, row_of, NUM_SQUARES};
use lazy_static::lazy_static;

pub const ROOK_DIRS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
pub const DIAG_DIRS: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

/// Ring of eight around a square, clockwise from the upper-left. Order
/// matters: a capture target's "legs" are its two ring neighbours.
pub const RING_DIRS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
];

/// One adjacent square a Lei may capture on, with the ring squares either
/// side of it. The target is capturable only when both legs are empty.
#[derive(Clone, Debug)]
pub struct LeiTarget {
    pub to: usize,
    pub legs: Vec<usize>,
}

/// Feng stations sit three diagonal steps apart; the track is every square
/// a station's four diagonals cover up to the next station.
pub const FENG_STEP: usize = 3;
/// Station flood fill starts from the top-left corner.
pub const FENG_TRACK_SEED: usize = 0;

pub struct FengTrack {
    pub stations: [bool; NUM_SQUARES],
    pub road: [bool; NUM_SQUARES],
    /// For each on-track square, up to four diagonal runs ending at the
    /// next station (inclusive) or the track edge.
    pub lines: Vec<Vec<Vec<usize>>>,
}

fn build_lei_ring() -> Vec<Vec<LeiTarget>> {
    let mut all = Vec::with_capacity(NUM_SQUARES);
    for sq in 0..NUM_SQUARES {
        let (row, col) = (row_of(sq) as i32, col_of(sq) as i32);
        let mut targets = Vec::new();
        for (idx, (dr, dc)) in RING_DIRS.iter().enumerate() {
            let (r, c) = (row + dr, col + dc);
            if !on_board(r, c) {
                continue;
            }
            let mut legs = Vec::with_capacity(2);
            for neighbour in [(idx + 7) % 8, (idx + 1) % 8] {
                let (lr, lc) = (row + RING_DIRS[neighbour].0, col + RING_DIRS[neighbour].1);
                if on_board(lr, lc) {
                    legs.push(index_of(lr as usize, lc as usize));
                }
            }
            targets.push(LeiTarget {
                to: index_of(r as usize, c as usize),
                legs,
            });
        }
        all.push(targets);
    }
    all
}

fn build_feng_track() -> FengTrack {
    let mut stations = [false; NUM_SQUARES];
    let mut road = [false; NUM_SQUARES];

    // Stations: BFS from the seed, jumping FENG_STEP diagonally.
    let mut queue = vec![FENG_TRACK_SEED];
    stations[FENG_TRACK_SEED] = true;
    let mut qi = 0;
    while qi < queue.len() {
        let now = queue[qi];
        qi += 1;
        let (r, c) = (row_of(now) as i32, col_of(now) as i32);
        for (dr, dc) in DIAG_DIRS {
            let (r2, c2) = (r + dr * FENG_STEP as i32, c + dc * FENG_STEP as i32);
            if !on_board(r2, c2) {
                continue;
            }
            let to = index_of(r2 as usize, c2 as usize);
            if !stations[to] {
                stations[to] = true;
                queue.push(to);
            }
        }
    }

    // The road: every diagonal square within FENG_STEP-1 of a station.
    for sq in 0..NUM_SQUARES {
        if !stations[sq] {
            continue;
        }
        road[sq] = true;
        let (r, c) = (row_of(sq) as i32, col_of(sq) as i32);
        for (dr, dc) in DIAG_DIRS {
            for step in 1..FENG_STEP as i32 {
                let (r2, c2) = (r + dr * step, c + dc * step);
                if !on_board(r2, c2) {
                    break;
                }
                road[index_of(r2 as usize, c2 as usize)] = true;
            }
        }
    }

    // Per-square track runs, each stopping at (and including) a station.
    let mut lines = Vec::with_capacity(NUM_SQUARES);
    for sq in 0..NUM_SQUARES {
        let mut runs = Vec::new();
        if road[sq] {
            let (r, c) = (row_of(sq) as i32, col_of(sq) as i32);
            for (dr, dc) in DIAG_DIRS {
                let mut run = Vec::new();
                let (mut r2, mut c2) = (r + dr, c + dc);
                while on_board(r2, c2) {
                    let to = index_of(r2 as usize, c2 as usize);
                    if !road[to] {
                        break;
                    }
                    run.push(to);
                    if stations[to] {
                        break;
                    }
                    r2 += dr;
                    c2 += dc;
                }
                if !run.is_empty() {
                    runs.push(run);
                }
            }
        }
        lines.push(runs);
    }

    FengTrack {
        stations,
        road,
        lines,
    }
}

lazy_static! {
    pub static ref LEI_RING: Vec<Vec<LeiTarget>> = build_lei_ring();
    pub static ref FENG_TRACK: FengTrack = build_feng_track();
}
