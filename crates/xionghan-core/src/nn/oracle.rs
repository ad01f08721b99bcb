//! Request queue, batch collection, and chunk dispatch.

use super::backend::{Device, InferenceBackend};
use super::features::{
    self, BIN_CHANNELS, GLOBAL_FEATURES, MAX_BATCH_SIZE, PLANE_SIZE, POLICY_SIZE, VALUE_SIZE,
};
use super::policy;
use crate::position::Position;
use crate::types::Side;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the collector waits for stragglers after the first request.
const BATCH_TIMEOUT: Duration = Duration::from_millis(1);
/// Queue capacity per unit of batch size.
const QUEUE_DEPTH_FACTOR: usize = 10;
/// Batch-size statistics are logged every this many batches.
const STATS_LOG_INTERVAL: i64 = 500;

/// Which policy head the caller wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageQuery {
    /// Distribution over origin squares.
    Choose,
    /// Distribution over destinations from a chosen origin.
    Place { origin: usize },
}

/// Errors surfaced to a waiting search thread.
#[derive(Debug, Clone)]
pub enum OracleError {
    /// The backend reported an inference failure.
    Inference(String),
    /// The oracle thread is gone (host shut it down mid-search).
    Closed,
    /// No backend could fit the request.
    NoBackend(usize),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Inference(msg) => write!(f, "inference failed: {msg}"),
            OracleError::Closed => write!(f, "oracle queue closed"),
            OracleError::NoBackend(n) => write!(f, "no runtime can hold a chunk of {n}"),
        }
    }
}

impl Error for OracleError {}

/// One post-processed network answer, in fixed-colour form.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub red_win: f32,
    pub black_win: f32,
    pub draw: f32,
    /// 170 slots; legal slots sum to 1, illegal slots hold the sentinel.
    pub policy: Vec<f32>,
}

struct EvalRequest {
    pos: Position,
    stage: StageQuery,
    reply: Sender<Result<Evaluation, OracleError>>,
}

#[derive(Default)]
struct OracleStats {
    total_items: AtomicI64,
    total_batches: AtomicI64,
}

/// Cloneable handle to the batching oracle.
#[derive(Clone)]
pub struct Oracle {
    queue: Sender<EvalRequest>,
    stats: Arc<OracleStats>,
    device: Device,
}

impl Oracle {
    /// Starts the batching thread over the given runtimes. Runtimes are
    /// sorted by capacity; the largest defines the maximum batch size.
    /// Capacities must be powers of two.
    pub fn spawn(mut backends: Vec<Box<dyn InferenceBackend>>) -> Oracle {
        assert!(!backends.is_empty(), "oracle needs at least one runtime");
        backends.sort_by_key(|b| b.capacity());
        for b in &backends {
            assert!(
                b.capacity().is_power_of_two(),
                "runtime capacity must be a power of two"
            );
        }
        let max_batch = backends.last().unwrap().capacity().min(MAX_BATCH_SIZE);
        let device = if backends.iter().any(|b| b.device() == Device::Gpu) {
            Device::Gpu
        } else {
            Device::Cpu
        };

        let (tx, rx) = bounded::<EvalRequest>(max_batch * QUEUE_DEPTH_FACTOR);
        let stats = Arc::new(OracleStats::default());
        let loop_stats = Arc::clone(&stats);
        std::thread::Builder::new()
            .name("nn-oracle".into())
            .spawn(move || batch_loop(rx, backends, max_batch, loop_stats))
            .expect("spawn oracle thread");

        Oracle {
            queue: tx,
            stats,
            device,
        }
    }

    /// Stage-0 query: value plus origin policy.
    pub fn evaluate(&self, pos: &Position) -> Result<Evaluation, OracleError> {
        self.evaluate_stage(pos, StageQuery::Choose)
    }

    pub fn evaluate_stage(
        &self,
        pos: &Position,
        stage: StageQuery,
    ) -> Result<Evaluation, OracleError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.queue
            .send(EvalRequest {
                pos: *pos,
                stage,
                reply: reply_tx,
            })
            .map_err(|_| OracleError::Closed)?;
        reply_rx.recv().map_err(|_| OracleError::Closed)?
    }

    /// How many search threads are worth running against this oracle.
    pub fn suggested_search_threads(&self) -> usize {
        match self.device {
            Device::Gpu => 16,
            Device::Cpu => 4,
        }
    }

    pub fn batches_processed(&self) -> i64 {
        self.stats.total_batches.load(Ordering::Relaxed)
    }
}

fn batch_loop(
    rx: Receiver<EvalRequest>,
    mut backends: Vec<Box<dyn InferenceBackend>>,
    max_batch: usize,
    stats: Arc<OracleStats>,
) {
    let mut pending: Vec<EvalRequest> = Vec::with_capacity(max_batch);
    loop {
        pending.clear();
        match rx.recv() {
            Ok(req) => pending.push(req),
            Err(_) => return,
        }
        let deadline = Instant::now() + BATCH_TIMEOUT;
        while pending.len() < max_batch {
            match rx.recv_deadline(deadline) {
                Ok(req) => pending.push(req),
                Err(_) => break,
            }
        }
        process_batch(&mut backends, max_batch, &pending);

        let items = stats
            .total_items
            .fetch_add(pending.len() as i64, Ordering::Relaxed)
            + pending.len() as i64;
        let batches = stats.total_batches.fetch_add(1, Ordering::Relaxed) + 1;
        if batches % STATS_LOG_INTERVAL == 0 {
            log::debug!(
                "oracle: {batches} batches, avg size {:.1}",
                items as f64 / batches as f64
            );
        }
    }
}

/// Split `n` requests into power-of-two chunk capacities: whole chunks of
/// `cap`, then a remainder split that wastes at most a quarter of any
/// chunk's padding.
pub(crate) fn partition_chunks(n: usize, cap: usize) -> Vec<usize> {
    let mut out = Vec::new();
    for _ in 0..n / cap {
        out.push(cap);
    }
    partition_remainder(n % cap, cap, &mut out);
    out
}

fn partition_remainder(r: usize, c: usize, out: &mut Vec<usize>) {
    if r == 0 {
        return;
    }
    if c <= 1 {
        out.push(1);
        return;
    }
    if r > 3 * c / 4 {
        out.push(c);
    } else if r > c / 2 {
        out.push(c / 2);
        let rest = r - c / 2;
        out.push(rest.next_power_of_two().min(c / 4).max(1));
    } else {
        partition_remainder(r, c / 2, out);
    }
}

fn process_batch(
    backends: &mut [Box<dyn InferenceBackend>],
    max_batch: usize,
    requests: &[EvalRequest],
) {
    let mut served = 0usize;
    for chunk_cap in partition_chunks(requests.len(), max_batch) {
        let take = chunk_cap.min(requests.len() - served);
        let chunk = &requests[served..served + take];
        served += take;
        run_chunk(backends, chunk_cap, chunk);
    }
}

fn run_chunk(
    backends: &mut [Box<dyn InferenceBackend>],
    chunk_cap: usize,
    requests: &[EvalRequest],
) {
    // Smallest runtime that fits the chunk; backends are sorted ascending.
    let backend = match backends.iter_mut().find(|b| b.capacity() >= chunk_cap) {
        Some(b) => b,
        None => {
            for req in requests {
                let _ = req.reply.send(Err(OracleError::NoBackend(chunk_cap)));
            }
            return;
        }
    };
    let cap = backend.capacity();

    let mut bin = vec![0.0f32; cap * BIN_CHANNELS * PLANE_SIZE];
    let mut global = vec![0.0f32; cap * GLOBAL_FEATURES];
    for (i, req) in requests.iter().enumerate() {
        features::encode_into(
            &req.pos,
            req.stage,
            &mut bin[i * BIN_CHANNELS * PLANE_SIZE..(i + 1) * BIN_CHANNELS * PLANE_SIZE],
            &mut global[i * GLOBAL_FEATURES..(i + 1) * GLOBAL_FEATURES],
        );
    }

    let output = match backend.run(&bin, &global) {
        Ok(out) => out,
        Err(err) => {
            log::warn!("oracle: inference failed on a chunk of {}: {err}", requests.len());
            for req in requests {
                let _ = req.reply.send(Err(err.clone()));
            }
            return;
        }
    };

    for (i, req) in requests.iter().enumerate() {
        let value = &output.value[i * VALUE_SIZE..(i + 1) * VALUE_SIZE];
        let (red_win, black_win, draw) = policy::value_triple(value, req.pos.side_to_move);

        let raw = &output.policy[i * POLICY_SIZE..(i + 1) * POLICY_SIZE];
        let oriented;
        let raw_for_board: &[f32] = if req.pos.side_to_move == Side::Black {
            oriented = features::unflip_policy(raw);
            &oriented
        } else {
            raw
        };
        let (mask, legal_count) = features::legal_mask(&req.pos, req.stage);
        let policy = policy::post_process_policy(raw_for_board, &mask, legal_count);

        let _ = req.reply.send(Ok(Evaluation {
            red_win,
            black_win,
            draw,
            policy,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::backend::InferenceOutput;

    /// Backend producing flat logits: uniform policy over legal slots.
    struct FlatBackend {
        cap: usize,
        calls: Arc<AtomicI64>,
    }

    impl InferenceBackend for FlatBackend {
        fn capacity(&self) -> usize {
            self.cap
        }
        fn run(&mut self, bin: &[f32], global: &[f32]) -> Result<InferenceOutput, OracleError> {
            assert_eq!(bin.len(), self.cap * BIN_CHANNELS * PLANE_SIZE);
            assert_eq!(global.len(), self.cap * GLOBAL_FEATURES);
            self.calls.fetch_add(1, Ordering::Relaxed);
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
            Err(OracleError::Inference("deliberate".into()))
        }
    }

    #[test]
    fn partition_full_chunks() {
        assert_eq!(partition_chunks(128, 64), vec![64, 64]);
        assert_eq!(partition_chunks(64, 64), vec![64]);
        assert_eq!(partition_chunks(0, 64), Vec::<usize>::new());
    }

    #[test]
    fn partition_remainder_rules() {
        // r > 3C/4 rounds up to C.
        assert_eq!(partition_chunks(49, 64), vec![64]);
        // C/2 < r <= 3C/4 becomes {C/2, pow2(r - C/2)} capped at C/4.
        assert_eq!(partition_chunks(40, 64), vec![32, 8]);
        assert_eq!(partition_chunks(48, 64), vec![32, 16]);
        // r <= C/2 recurses at half capacity.
        assert_eq!(partition_chunks(20, 64), vec![16, 4]);
        assert_eq!(partition_chunks(1, 64), vec![1]);
        assert_eq!(partition_chunks(3, 64), vec![2, 1]);
    }

    #[test]
    fn partition_covers_and_bounds_padding() {
        for cap in [1usize, 2, 4, 8, 16, 32, 64] {
            for n in 1..=3 * cap {
                let chunks = partition_chunks(n, cap);
                let total: usize = chunks.iter().sum();
                assert!(total >= n, "n={n} cap={cap} chunks={chunks:?}");
                for &c in &chunks {
                    assert!(c.is_power_of_two());
                    assert!(c <= cap);
                }
                // Greedy assignment always fills more than half of every
                // chunk: the trailing power-of-two chunk is the only place
                // padding appears and it never doubles its load.
                let mut remaining = n;
                for &c in &chunks {
                    let used = c.min(remaining);
                    remaining -= used;
                    assert!(used * 2 > c || c == 1, "chunk {c} only {used} used (n={n} cap={cap})");
                }
                assert_eq!(remaining, 0);
            }
        }
    }

    #[test]
    fn oracle_serves_uniform_policy() {
        let calls = Arc::new(AtomicI64::new(0));
        let oracle = Oracle::spawn(vec![Box::new(FlatBackend {
            cap: 8,
            calls: Arc::clone(&calls),
        })]);
        let pos = Position::initial();
        let eval = oracle.evaluate(&pos).unwrap();
        let sum: f32 = eval.policy.iter().filter(|&&p| p >= 0.0).sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!((eval.red_win + eval.black_win + eval.draw - 1.0).abs() < 1e-5);
        assert!(calls.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn oracle_routes_to_smallest_fitting_runtime() {
        let small_calls = Arc::new(AtomicI64::new(0));
        let large_calls = Arc::new(AtomicI64::new(0));
        let oracle = Oracle::spawn(vec![
            Box::new(FlatBackend {
                cap: 8,
                calls: Arc::clone(&large_calls),
            }),
            Box::new(FlatBackend {
                cap: 1,
                calls: Arc::clone(&small_calls),
            }),
        ]);
        let pos = Position::initial();
        // A lone request fits the single-slot runtime.
        oracle.evaluate(&pos).unwrap();
        assert_eq!(small_calls.load(Ordering::Relaxed), 1);
        assert_eq!(large_calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn failing_backend_propagates_error() {
        let oracle = Oracle::spawn(vec![Box::new(FailingBackend)]);
        let pos = Position::initial();
        match oracle.evaluate(&pos) {
            Err(OracleError::Inference(msg)) => assert_eq!(msg, "deliberate"),
            other => panic!("expected inference error, got {other:?}"),
        }
    }

    #[test]
    fn stage1_policy_sums_over_destinations() {
        let oracle = Oracle::spawn(vec![Box::new(FlatBackend {
            cap: 4,
            calls: Arc::new(AtomicI64::new(0)),
        })]);
        let pos = Position::initial();
        let origin = crate::position::index_of(8, 4);
        let eval = oracle
            .evaluate_stage(&pos, StageQuery::Place { origin })
            .unwrap();
        let legal = crate::movegen::legal(&pos, false);
        let dest_count = legal.iter().filter(|m| m.from_sq() == origin).count();
        let live: Vec<f32> = eval.policy.iter().cloned().filter(|&p| p >= 0.0).collect();
        assert_eq!(live.len(), dest_count);
        let sum: f32 = live.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }
}
