//! The batched neural oracle.
//!
//! Search threads submit `(position, stage, origin)` queries and block on a
//! per-request reply channel. A single consumer drains the queue, packs
//! requests into power-of-two chunks, runs one inference per chunk on the
//! smallest fitting runtime, and fans the post-processed results back out.
//!
//! The crate never loads models or picks execution providers; the host
//! passes in anything implementing [`InferenceBackend`].

pub mod backend;
pub mod cache;
pub mod features;
mod oracle;
mod policy;

pub use backend::{Device, InferenceBackend, InferenceOutput};
pub use cache::ValueCache;
pub use features::{
    BIN_CHANNELS, BOARD_SIZE, GLOBAL_FEATURES, MAX_BATCH_SIZE, PLANE_SIZE, POLICY_SIZE, VALUE_SIZE,
};
pub use oracle::{Evaluation, Oracle, OracleError, StageQuery};

#[cfg(feature = "ort-backend")]
pub mod ort_backend;
