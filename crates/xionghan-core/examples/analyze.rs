//! Analyse a position from the command line without a real model: attaches
//! a uniform-policy backend so the search plumbing can be exercised
//! end-to-end.
//!
//!     cargo run --example analyze -- "<fen>" [depth]

use xionghan_core::nn::{
    InferenceBackend, InferenceOutput, Oracle, OracleError, BIN_CHANNELS, GLOBAL_FEATURES,
    PLANE_SIZE, POLICY_SIZE, VALUE_SIZE,
};
use xionghan_core::{Engine, Position, SearchConfig};

struct UniformBackend {
    cap: usize,
}

impl InferenceBackend for UniformBackend {
    fn capacity(&self) -> usize {
        self.cap
    }
    fn run(&mut self, bin: &[f32], global: &[f32]) -> Result<InferenceOutput, OracleError> {
        assert_eq!(bin.len(), self.cap * BIN_CHANNELS * PLANE_SIZE);
        assert_eq!(global.len(), self.cap * GLOBAL_FEATURES);
        Ok(InferenceOutput {
            policy: vec![0.0; self.cap * POLICY_SIZE],
            value: vec![0.0; self.cap * VALUE_SIZE],
        })
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let pos = match args.next() {
        Some(fen) => Position::decode(&fen).expect("malformed position string"),
        None => Position::initial(),
    };
    let depth: u32 = args.next().and_then(|d| d.parse().ok()).unwrap_or(2);

    let mut engine = Engine::new();
    engine.attach_oracle(Oracle::spawn(vec![
        Box::new(UniformBackend { cap: 1 }),
        Box::new(UniformBackend { cap: 16 }),
    ]));

    let cfg = SearchConfig {
        max_depth: depth,
        time_limit_ms: 10_000,
        ..SearchConfig::default()
    };
    let result = engine.search(&pos, &cfg);
    println!("position  {}", pos.encode());
    println!(
        "best move {} (score {}, red win {:.1}%)",
        result.best_move,
        result.score,
        result.win_prob * 100.0
    );
    println!(
        "depth {} nodes {} in {} ms{}",
        result.depth,
        result.nodes,
        result.time_ms,
        if result.nn_failed { "  [nn failed]" } else { "" }
    );
}
