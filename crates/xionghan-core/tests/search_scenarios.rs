//! End-to-end search scenarios against a deterministic mock oracle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use xionghan_core::nn::{
    InferenceBackend, InferenceOutput, Oracle, OracleError, BIN_CHANNELS, GLOBAL_FEATURES,
    PLANE_SIZE, POLICY_SIZE, VALUE_SIZE,
};
use xionghan_core::search::{try_play, PlayError, DEFAULT_REPETITION_THRESHOLD};
use xionghan_core::{Engine, Move, PieceType, Position, SearchConfig, Side};

/// Zero logits everywhere: a uniform policy over legal slots and an even
/// value head. Counts served requests by the on-board plane of each live
/// sample (padding slots stay zero).
struct FlatBackend {
    cap: usize,
    served: Arc<AtomicUsize>,
}

impl InferenceBackend for FlatBackend {
    fn capacity(&self) -> usize {
        self.cap
    }
    fn run(&mut self, bin: &[f32], global: &[f32]) -> Result<InferenceOutput, OracleError> {
        assert_eq!(bin.len(), self.cap * BIN_CHANNELS * PLANE_SIZE);
        assert_eq!(global.len(), self.cap * GLOBAL_FEATURES);
        let live = (0..self.cap)
            .filter(|i| bin[i * BIN_CHANNELS * PLANE_SIZE] == 1.0)
            .count();
        self.served.fetch_add(live, Ordering::Relaxed);
        Ok(InferenceOutput {
            policy: vec![0.0; self.cap * POLICY_SIZE],
            value: vec![0.0; self.cap * VALUE_SIZE],
        })
    }
}

struct FailingBackend;

impl InferenceBackend for FailingBackend {
    fn capacity(&self) -> usize {
        8
    }
    fn run(&mut self, _: &[f32], _: &[f32]) -> Result<InferenceOutput, OracleError> {
        Err(OracleError::Inference("backend offline".into()))
    }
}

fn flat_oracle() -> (Oracle, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let oracle = Oracle::spawn(vec![
        Box::new(FlatBackend {
            cap: 1,
            served: Arc::clone(&calls),
        }),
        Box::new(FlatBackend {
            cap: 8,
            served: Arc::clone(&calls),
        }),
        Box::new(FlatBackend {
            cap: 64,
            served: Arc::clone(&calls),
        }),
    ]);
    (oracle, calls)
}

#[test]
fn initial_position_depth_one_returns_a_red_move() {
    let (oracle, calls) = flat_oracle();
    let mut engine = Engine::with_seed(11);
    engine.attach_oracle(oracle);

    let pos = Position::initial();
    let cfg = SearchConfig {
        max_depth: 1,
        ..SearchConfig::default()
    };
    let res = engine.search(&pos, &cfg);

    assert!(!res.nn_failed);
    assert!(!res.best_move.is_none());
    assert_eq!(
        pos.piece_at(res.best_move.from_sq()).side(),
        Some(Side::Red)
    );
    assert_eq!(res.depth, 1);
    assert!(calls.load(Ordering::Relaxed) > 0);
    assert!((0.0..=1.0).contains(&res.win_prob));
}

#[test]
fn lone_king_with_no_moves_yields_sentinel() {
    let (oracle, _) = flat_oracle();
    let mut engine = Engine::with_seed(3);
    engine.attach_oracle(oracle);

    // Red king on d1, outside its palace: not a single legal move.
    let pos = Position::decode("13/13/13/13/13/13/13/13/13/13/13/13/4E8 w").unwrap();
    let res = engine.search(&pos, &SearchConfig::default());
    assert_eq!(res.best_move, Move::NONE);
    assert!(res.score >= 0);
    assert!(!res.nn_failed);
}

#[test]
fn king_capture_is_taken_immediately() {
    let (oracle, _) = flat_oracle();
    let mut engine = Engine::with_seed(5);
    engine.attach_oracle(oracle);

    let fen = "13/13/3bcdedcb3/13/13/13/6A6/13/13/13/13/3BCDEDCB3/13 w";
    let pos = Position::decode(fen).unwrap();
    let res = engine.search(&pos, &SearchConfig::default());
    let king = pos.king_square(Side::Black).unwrap();
    assert_eq!(res.best_move.to_sq(), king);
    assert!((res.win_prob - 1.0).abs() < f32::EPSILON);
}

#[test]
fn threefold_repetition_is_rejected_at_play() {
    // Rook shuffle in a four-piece endgame with no forced win available.
    let pos = Position::decode("13/13/6e6/13/13/13/13/13/13/13/6D6/A5E6/13 w").unwrap();
    assert!(pos.total_pieces() < DEFAULT_REPETITION_THRESHOLD);

    let shuffle = Move {
        from: (11 * 13) as i16,
        to: (12 * 13) as i16,
    };
    let next = pos.apply_move(shuffle).unwrap();
    let mut history = HashMap::new();
    history.insert(next.hash, 2u32);

    assert_eq!(
        try_play(&pos, shuffle, &history, DEFAULT_REPETITION_THRESHOLD),
        Err(PlayError::RepetitionForbidden)
    );
    assert!(try_play(&pos, shuffle, &HashMap::new(), DEFAULT_REPETITION_THRESHOLD).is_ok());

    // And MCTS under the same history never proposes the shuffle.
    let (oracle, _) = flat_oracle();
    let mut engine = Engine::with_seed(9);
    engine.attach_oracle(oracle);
    let cfg = SearchConfig {
        use_mcts: true,
        mcts_simulations: 64,
        repetition_history: history,
        ..SearchConfig::default()
    };
    let res = engine.search(&pos, &cfg);
    assert!(!res.best_move.is_none());
    assert_ne!(res.best_move, shuffle);
}

#[test]
fn failing_oracle_reports_failure_with_fallback() {
    let mut engine = Engine::with_seed(13);
    engine.attach_oracle(Oracle::spawn(vec![Box::new(FailingBackend)]));

    let pos = Position::initial();
    let res = engine.search(&pos, &SearchConfig::default());
    assert!(res.nn_failed);
    if res.best_move == Move::NN_FAILED {
        panic!("fallback should exist in the initial position");
    }
    // The fallback is a real legal move.
    assert!(pos.apply_move(res.best_move).is_some());
}

#[test]
fn barren_position_short_circuits_before_inference() {
    let mut engine = Engine::with_seed(13);
    engine.attach_oracle(Oracle::spawn(vec![Box::new(FailingBackend)]));

    let pos = Position::decode("13/13/13/13/13/13/13/13/13/13/13/13/4E8 w").unwrap();
    let cfg = SearchConfig {
        use_mcts: true,
        mcts_simulations: 8,
        ..SearchConfig::default()
    };
    let res = engine.search(&pos, &cfg);
    // Barren position short-circuits before inference: a no-moves answer.
    assert_eq!(res.best_move, Move::NONE);
}

#[test]
fn mcts_on_initial_position_gives_a_legal_move() {
    let (oracle, _) = flat_oracle();
    let mut engine = Engine::with_seed(21);
    engine.attach_oracle(oracle);

    let pos = Position::initial();
    let cfg = SearchConfig {
        use_mcts: true,
        mcts_simulations: 16,
        time_limit_ms: 30_000,
        ..SearchConfig::default()
    };
    let res = engine.search(&pos, &cfg);
    assert!(!res.nn_failed);
    assert!(!res.best_move.is_none());
    assert_eq!(
        pos.piece_at(res.best_move.from_sq()).side(),
        Some(Side::Red)
    );
    // Locked Lei never move in the opening.
    assert_ne!(
        pos.piece_at(res.best_move.from_sq()).kind(),
        Some(PieceType::Lei)
    );
    assert!(res.nodes > 0);
}

/// Reads the piece planes back out of the input tensor and scores raw
/// material from the mover's perspective, so the search has a real signal
/// to climb.
struct MaterialBackend {
    cap: usize,
}

const PIECE_WEIGHTS: [f32; 11] = [
    0.0, 5.0, 4.0, 4.5, 2.0, 2.0, 100.0, 1.0, 5.0, 3.5, 2.5,
];

impl InferenceBackend for MaterialBackend {
    fn capacity(&self) -> usize {
        self.cap
    }
    fn run(&mut self, bin: &[f32], _global: &[f32]) -> Result<InferenceOutput, OracleError> {
        let mut value = vec![0.0f32; self.cap * VALUE_SIZE];
        for i in 0..self.cap {
            let sample = &bin[i * BIN_CHANNELS * PLANE_SIZE..(i + 1) * BIN_CHANNELS * PLANE_SIZE];
            let mut diff = 0.0f32;
            for (code, w) in PIECE_WEIGHTS.iter().enumerate().skip(1) {
                let own: f32 = sample[code * PLANE_SIZE..(code + 1) * PLANE_SIZE].iter().sum();
                let opp: f32 = sample[(code + 11) * PLANE_SIZE..(code + 12) * PLANE_SIZE]
                    .iter()
                    .sum();
                diff += w * (own - opp);
            }
            value[i * VALUE_SIZE] = diff * 0.5;
            value[i * VALUE_SIZE + 1] = -diff * 0.5;
        }
        Ok(InferenceOutput {
            policy: vec![0.0; self.cap * POLICY_SIZE],
            value,
        })
    }
}

#[test]
fn search_prefers_the_hanging_rook() {
    let mut engine = Engine::with_seed(2);
    engine.attach_oracle(Oracle::spawn(vec![Box::new(MaterialBackend { cap: 16 })]));

    // Black rook hangs on the red rook's rank; nothing recaptures.
    let fen = "13/6e6/13/13/13/13/A5a6/13/13/13/13/5E7/13 w";
    let pos = Position::decode(fen).unwrap();
    let cfg = SearchConfig {
        max_depth: 1,
        ..SearchConfig::default()
    };
    let res = engine.search(&pos, &cfg);
    assert!(!res.nn_failed);
    assert_eq!(res.best_move, Move { from: 6 * 13, to: 6 * 13 + 6 });
    assert!(res.score > 0, "capturing a rook must read as a red gain");
}

#[test]
fn tt_persists_across_searches_within_one_engine() {
    let (oracle, calls) = flat_oracle();
    let mut engine = Engine::with_seed(17);
    engine.attach_oracle(oracle);

    let pos = Position::initial();
    let cfg = SearchConfig {
        max_depth: 1,
        ..SearchConfig::default()
    };
    let _ = engine.search(&pos, &cfg);
    let first = calls.load(Ordering::Relaxed);
    let _ = engine.search(&pos, &cfg);
    let second = calls.load(Ordering::Relaxed) - first;
    // Leaf values come back from the shared cache the second time, so the
    // oracle sees strictly fewer requests.
    assert!(second < first, "second search hit the oracle {second} times, first {first}");
}
