//! Quorum thresholds and flags.
//!
//! Two independent thresholds; a list is admitted when **either** applicable
//! one is met:
//! - per-constituency: the list reaches `row_quorum_percent` of the votes in
//!   at least one constituency;
//! - union-wide: the list reaches `total_quorum_percent` of all votes cast.
//!
//! An unconfigured threshold is not applicable; with neither configured every
//! list passes. Comparisons cross-multiply in `u128` — `100·votes ≥
//! pct·total` — so no division or rounding enters the decision. Lists failing
//! every applicable quorum stay in the matrix for reporting but are fixed at
//! zero target seats.

use dp_core::params::Params;
use dp_core::rounding::Ratio;

use num_bigint::BigInt;

use crate::matrix::ResultMatrix;

/// Quorum flags of one list (column).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnQuorum {
    /// Reached the per-constituency quorum in at least one constituency;
    /// `None` when that threshold is not configured.
    pub any_row_reached: Option<bool>,
    /// Reached the union-wide quorum; `None` when not configured.
    pub total_reached: Option<bool>,
}

impl ColumnQuorum {
    /// Admitted to the super-apportionment.
    pub fn passed(&self) -> bool {
        match (self.any_row_reached, self.total_reached) {
            (None, None) => true,
            (a, b) => a.unwrap_or(false) || b.unwrap_or(false),
        }
    }
}

/// Computed thresholds and per-column flags.
#[derive(Clone, Debug, PartialEq)]
pub struct QuorumAssessment {
    /// Exact per-constituency vote thresholds, one per row; `None` when the
    /// row threshold is not configured.
    pub row_thresholds: Vec<Option<Ratio>>,
    pub columns: Vec<ColumnQuorum>,
}

impl QuorumAssessment {
    /// Indices of the admitted columns, in matrix order.
    pub fn admitted_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, q)| q.passed())
            .map(|(i, _)| i)
            .collect()
    }
}

/// `100·votes ≥ pct·total`, exactly; a zero total never reaches a quorum.
#[inline]
fn reaches(votes: u64, pct: u8, total: u64) -> bool {
    if total == 0 {
        return false;
    }
    (votes as u128) * 100 >= (pct as u128) * (total as u128)
}

/// Exact threshold value `pct·total / 100` for reporting.
fn threshold(pct: u8, total: u64) -> Ratio {
    Ratio::new(BigInt::from(u128::from(pct) * u128::from(total)), BigInt::from(100))
}

pub fn assess(matrix: &ResultMatrix, params: &Params) -> QuorumAssessment {
    let row_thresholds: Vec<Option<Ratio>> = matrix
        .rows()
        .iter()
        .map(|r| params.row_quorum_percent.map(|pct| threshold(pct, r.total_votes)))
        .collect();

    let grand_total = matrix.grand_total();
    let columns = (0..matrix.column_count())
        .map(|c| {
            let any_row_reached = params.row_quorum_percent.map(|pct| {
                matrix
                    .rows()
                    .iter()
                    .enumerate()
                    .any(|(r, row)| reaches(matrix.votes(r, c), pct, row.total_votes))
            });
            let total_reached = params
                .total_quorum_percent
                .map(|pct| reaches(matrix.columns()[c].total_votes, pct, grand_total));
            ColumnQuorum { any_row_reached, total_reached }
        })
        .collect();

    QuorumAssessment { row_thresholds, columns }
}
