//! Crate-wide error type.
//!
//! Per the propagation policy: only configuration/setup and fatal
//! allocation paths return `Result<_, EngineError>`. The move generator,
//! evaluator, and the transposition-table/endgame-database probe
//! surfaces never fail — they report "not found" through `Option`/`bool`
//! instead of an error variant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("illegal FEN: {0}")]
    IllegalFen(String),

    #[error("endgame database file {name}: {reason}")]
    EndgameFile { name: String, reason: String },

    #[error("failed to allocate the transposition table")]
    TranspositionTableAlloc,
}
