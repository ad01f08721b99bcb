//! The alpha-beta search subsystem: per-game engine, transposition table,
//! tactical move filters, and the give-away memo.

mod alpha_beta;
pub mod blunder;
mod config;
mod engine;
pub mod filters;
pub mod tt;

pub use blunder::BlunderMemo;
pub use config::{GameStatus, SearchConfig, SearchResult, DEFAULT_REPETITION_THRESHOLD};
pub use engine::{try_play, Engine, PlayError};
pub use tt::{Bound, TranspositionTable, TtEntry};
