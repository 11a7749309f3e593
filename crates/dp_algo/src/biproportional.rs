//! Contract required of the external biproportional matrix-fitting engine.
//!
//! The engine performs the sub-apportionment row/column fitting (iterative
//! proportional fitting with transfer-based tie resolution). This crate calls
//! it but does not implement it; everything the orchestrator consumes from it
//! is specified here.
//!
//! Obligations on an implementation:
//! - Output shapes match the input: `cell_seats` and `cell_ties` are
//!   rows × columns, divisors are one per row and one per column.
//! - `round(votes / (row_divisor · col_divisor))` with exact `n + 1/2`
//!   rounding up reproduces every reported cell seat. Tied cells sit exactly
//!   on a boundary and are provisionally rounded **up**, flagged `Negative`.
//! - Per row and per column, confirmed seats (held minus one per tied cell)
//!   plus the open disputed seats equal the requested target.

use alloc::vec::Vec;
use core::fmt;

use dp_core::rounding::Ratio;
use dp_core::state::TieState;

/// Vote matrix with fixed row/column seat targets.
#[derive(Clone, Copy, Debug)]
pub struct BiproportionalInput<'a> {
    /// Raw vote counts, rows × columns.
    pub votes: &'a [Vec<u64>],
    pub row_targets: &'a [u32],
    pub col_targets: &'a [u32],
}

/// Fitted result: per-cell seats and tie flags, one divisor per row/column.
#[derive(Clone, Debug, PartialEq)]
pub struct BiproportionalFit {
    pub cell_seats: Vec<Vec<u32>>,
    pub cell_ties: Vec<Vec<TieState>>,
    pub row_divisors: Vec<Ratio>,
    pub col_divisors: Vec<Ratio>,
}

impl BiproportionalFit {
    pub fn has_ties(&self) -> bool {
        self.cell_ties
            .iter()
            .any(|row| row.iter().any(|t| t.is_tied()))
    }

    /// True iff all output dimensions match `rows` × `columns`.
    pub fn shape_matches(&self, rows: usize, columns: usize) -> bool {
        self.cell_seats.len() == rows
            && self.cell_ties.len() == rows
            && self.row_divisors.len() == rows
            && self.col_divisors.len() == columns
            && self.cell_seats.iter().all(|r| r.len() == columns)
            && self.cell_ties.iter().all(|r| r.len() == columns)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BiproportionalError {
    /// Input or output dimensions are inconsistent.
    ShapeMismatch,
    /// No fitting exists for the requested targets.
    Infeasible,
}

impl fmt::Display for BiproportionalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiproportionalError::ShapeMismatch => write!(f, "matrix dimensions are inconsistent"),
            BiproportionalError::Infeasible => write!(f, "no fitting satisfies the seat targets"),
        }
    }
}

/// The external matrix-fitting collaborator.
pub trait BiproportionalEngine {
    fn fit(&self, input: &BiproportionalInput<'_>) -> Result<BiproportionalFit, BiproportionalError>;
}
