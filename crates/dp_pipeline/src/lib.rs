//! dp_pipeline — deterministic orchestration of one double-proportional
//! computation (matrix → quorum → super-apportionment → sub-apportionment →
//! select divisors → lot decisions).
//!
//! This crate stays I/O-free and delegates math to `dp_algo`. One computation
//! is synchronous and single-threaded; the calling layer must guarantee
//! at most one concurrent computation per election union, since the matrix
//! invariants are unsafe under concurrent partial writes.

#![forbid(unsafe_code)]

use thiserror::Error;

use dp_algo::{AllocError, BiproportionalError, LotError};
use dp_core::errors::CoreError;

pub mod matrix;
pub mod quorum;
pub mod select_divisors;
pub mod orchestrator;

pub use matrix::{ConstituencyVotes, MatrixError, ResultMatrix};
pub use orchestrator::{DoubleProportional, StageState, SubOutcome, SuperOutcome};
pub use quorum::{ColumnQuorum, QuorumAssessment};
pub use select_divisors::{PublishedDivisors, SelectDivisorError};

/// Single error surface for the pipeline orchestration.
///
/// Algorithmic infeasibility and reconciliation mismatches are fatal for the
/// current computation: the stage is marked `Error` with no partial seat
/// counts committed. Open ties are *not* errors and never appear here.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("parameters: {0}")]
    Params(CoreError),
    #[error("matrix: {0}")]
    Matrix(#[from] MatrixError),
    #[error("super-apportionment: {0}")]
    SuperApportionment(AllocError),
    #[error("sub-apportionment engine: {0}")]
    Engine(BiproportionalError),
    #[error("select divisors: {0}")]
    SelectDivisors(#[from] SelectDivisorError),
    #[error("seat conservation violated: {0}")]
    Conservation(&'static str),
    #[error("lot enumeration: {0}")]
    Lot(LotError),
    #[error("lot candidate rejected: {0}")]
    InvalidLotCandidate(&'static str),
    #[error("stage not ready: {0}")]
    StageNotReady(&'static str),
}
