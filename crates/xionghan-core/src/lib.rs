//! Xionghan search core.
//!
//! The crate is organised leaves-first:
//!
//! - [`types`]: sides, piece codes, moves, scores
//! - [`position`]: board state, Zobrist hashing, FEN, attack queries
//! - [`movegen`]: pseudo-legal and legal move generation
//! - [`nn`]: the batched neural oracle and its tensor encoding
//! - [`vcf`]: the connect-check (forced mate) searcher
//! - [`search`]: the alpha-beta engine, transposition table, move filters
//! - [`mcts`]: the parallel PUCT searcher
//!
//! The HTTP layer, model loading, and execution-provider selection live in
//! the host process; the core only consumes an [`nn::InferenceBackend`].

pub mod mcts;
pub mod movegen;
pub mod nn;
pub mod position;
pub mod search;
pub mod types;
pub mod vcf;

pub use movegen::MoveList;
pub use position::{DecodeError, Position};
pub use search::{Engine, GameStatus, SearchConfig, SearchResult};
pub use types::{Move, Piece, PieceType, Side};
