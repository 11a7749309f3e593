//! Published divisor reconciliation for the sub-apportionment.
//!
//! The fitting engine returns one exact divisor per row and per column, but a
//! divisor pair is only determined up to a scaling factor, and the engine's
//! values carry search precision that must not leak into an official result.
//! This module:
//!
//! 1. normalizes by the median column divisor (column divisors divided by it,
//!    row divisors multiplied by it), pinning the published column divisors
//!    near 1;
//! 2. for a tie-free fit, re-derives each row's feasible open divisor
//!    interval from the cell seats and publishes a clean divisor inside it,
//!    then does the same per column against the clean row divisors;
//! 3. validates that `round(votes / (row_divisor · col_divisor))`, with exact
//!    halves rounding up, reproduces every cell seat.
//!
//! Any failure discards the entire result — published divisors that do not
//! explain the committed seats must never be half-committed.
//!
//! With open ties the engine divisors are published after normalization only:
//! tied cells sit exactly on rounding boundaries there, which is precisely
//! the state a lot decision later resolves.

use dp_core::rounding::{half, ratio_u64, round_half_up_u32, Ratio};

use dp_algo::divisor::find_clean_divisor;

use num_traits::Zero;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SelectDivisorError {
    #[error("no column divisors supplied")]
    Empty,
    #[error("divisor is not positive")]
    NonPositiveDivisor,
    #[error("row {row}: no divisor interval reproduces its seats")]
    EmptyRowInterval { row: usize },
    #[error("column {column}: no divisor interval reproduces its seats")]
    EmptyColumnInterval { column: usize },
    #[error("cell ({row}, {column}): divisors derive {derived} seats, engine committed {committed}")]
    CellMismatch { row: usize, column: usize, derived: u32, committed: u32 },
}

/// Published per-row and per-column divisors.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedDivisors {
    pub row_divisors: Vec<Ratio>,
    pub col_divisors: Vec<Ratio>,
}

/// Normalize, optionally clean, and validate the divisor set.
///
/// `clean` must be false while the fit still carries open ties.
pub fn publish(
    votes: &[Vec<u64>],
    cell_seats: &[Vec<u32>],
    row_divisors: &[Ratio],
    col_divisors: &[Ratio],
    clean: bool,
) -> Result<PublishedDivisors, SelectDivisorError> {
    if col_divisors.is_empty() || row_divisors.is_empty() {
        return Err(SelectDivisorError::Empty);
    }
    if row_divisors.iter().chain(col_divisors.iter()).any(|d| d <= &Ratio::zero()) {
        return Err(SelectDivisorError::NonPositiveDivisor);
    }

    let pivot = median(col_divisors);
    let cols_norm: Vec<Ratio> = col_divisors.iter().map(|c| c / &pivot).collect();
    let rows_norm: Vec<Ratio> = row_divisors.iter().map(|r| r * &pivot).collect();

    if !clean {
        validate(votes, cell_seats, &rows_norm, &cols_norm)?;
        return Ok(PublishedDivisors { row_divisors: rows_norm, col_divisors: cols_norm });
    }

    // Rows first, against the normalized column divisors.
    let mut rows_clean = Vec::with_capacity(rows_norm.len());
    for (r, row) in votes.iter().enumerate() {
        let (lower, upper) = divisor_interval(row.iter().copied(), cell_seats[r].iter().copied(), &cols_norm)
            .ok_or(SelectDivisorError::EmptyRowInterval { row: r })?;
        if lower >= upper {
            return Err(SelectDivisorError::EmptyRowInterval { row: r });
        }
        rows_clean.push(find_clean_divisor(&lower, &upper));
    }

    // Columns second, against the clean row divisors.
    let mut cols_clean = Vec::with_capacity(cols_norm.len());
    for c in 0..cols_norm.len() {
        let column_votes = votes.iter().map(|row| row[c]);
        let column_seats = cell_seats.iter().map(|row| row[c]);
        let (lower, upper) = divisor_interval(column_votes, column_seats, &rows_clean)
            .ok_or(SelectDivisorError::EmptyColumnInterval { column: c })?;
        if lower >= upper {
            return Err(SelectDivisorError::EmptyColumnInterval { column: c });
        }
        cols_clean.push(find_clean_divisor(&lower, &upper));
    }

    validate(votes, cell_seats, &rows_clean, &cols_clean)?;
    Ok(PublishedDivisors { row_divisors: rows_clean, col_divisors: cols_clean })
}

/// Feasible open interval for one line's divisor, given the other dimension's
/// divisors: every cell must satisfy `votes/(d·other) ∈ [s−1/2, s+1/2)`.
/// `None` when no cell constrains the respective side.
fn divisor_interval(
    votes: impl Iterator<Item = u64>,
    seats: impl Iterator<Item = u32>,
    other: &[Ratio],
) -> Option<(Ratio, Ratio)> {
    let mut lower: Option<Ratio> = None;
    let mut upper: Option<Ratio> = None;

    for (i, (v, s)) in votes.zip(seats).enumerate() {
        if v == 0 {
            // A zero-vote cell can only ever round to zero seats; a nonzero
            // commitment surfaces later as a validation mismatch.
            continue;
        }
        let v = ratio_u64(v);

        // d must stay above votes/(other·(s+1/2)) or the cell gains a seat.
        let gain = &v / (&other[i] * (ratio_u64(u64::from(s)) + half()));
        if lower.as_ref().map_or(true, |cur| &gain > cur) {
            lower = Some(gain);
        }

        // And at or below votes/(other·(s−1/2)) or it loses one.
        if s >= 1 {
            let keep = &v / (&other[i] * (ratio_u64(u64::from(s)) - half()));
            if upper.as_ref().map_or(true, |cur| &keep < cur) {
                upper = Some(keep);
            }
        }
    }

    match (lower, upper) {
        (Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    }
}

/// Re-derive every cell from the divisor pair; exact halves round up.
fn validate(
    votes: &[Vec<u64>],
    cell_seats: &[Vec<u32>],
    row_divisors: &[Ratio],
    col_divisors: &[Ratio],
) -> Result<(), SelectDivisorError> {
    for (r, row) in votes.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            let quotient = ratio_u64(v) / (&row_divisors[r] * &col_divisors[c]);
            let derived = round_half_up_u32(&quotient)
                .ok_or(SelectDivisorError::CellMismatch {
                    row: r,
                    column: c,
                    derived: u32::MAX,
                    committed: cell_seats[r][c],
                })?;
            if derived != cell_seats[r][c] {
                return Err(SelectDivisorError::CellMismatch {
                    row: r,
                    column: c,
                    derived,
                    committed: cell_seats[r][c],
                });
            }
        }
    }
    Ok(())
}

/// Exact median; the mean of the two central values for even counts.
fn median(divisors: &[Ratio]) -> Ratio {
    let mut sorted: Vec<Ratio> = divisors.to_vec();
    sorted.sort();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2].clone()
    } else {
        (&sorted[n / 2 - 1] + &sorted[n / 2]) / ratio_u64(2)
    }
}
