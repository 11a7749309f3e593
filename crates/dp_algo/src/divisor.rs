//! Rounding-boundary divisors and the clean-divisor search.
//!
//! Contract:
//! - `boundary_divisors` is pure: for each unit it reports the divisor at
//!   which the unit's rounded seat count changes, or an infinite sentinel when
//!   no positive divisor exists (zero weight, or a non-positive shifted
//!   denominator).
//! - `find_clean_divisor` picks a publishable divisor strictly inside an open
//!   interval, rounded to the coarsest decimal precision that still fits.
//!   Published divisors are part of an official result; a raw midpoint would
//!   leak implementation precision into it.
//!
//! Determinism: exact rational arithmetic throughout; no floats anywhere.

use alloc::vec::Vec;

use dp_core::rounding::{ratio_u64, round_to_decimals, Ratio};

use num_traits::Zero;

/// Divisor at which a unit's rounded seat count changes, or "never".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundaryDivisor {
    Finite(Ratio),
    /// No positive divisor moves this unit across the boundary.
    Infinite,
}

impl BoundaryDivisor {
    #[inline]
    pub fn finite(&self) -> Option<&Ratio> {
        match self {
            BoundaryDivisor::Finite(d) => Some(d),
            BoundaryDivisor::Infinite => None,
        }
    }
}

/// Per-unit boundary divisors `weight / (seats + delta)`.
///
/// Callers pass `delta = ±1/2`: `+1/2` yields the divisor at or below which a
/// unit gains its next seat, `-1/2` the divisor above which it loses its last
/// one. Entries where the quotient would not be positive come back as
/// [`BoundaryDivisor::Infinite`].
pub fn boundary_divisors(weights: &[Ratio], seats: &[u32], delta: &Ratio) -> Vec<BoundaryDivisor> {
    debug_assert_eq!(weights.len(), seats.len());
    weights
        .iter()
        .zip(seats.iter())
        .map(|(w, &s)| {
            let den = ratio_u64(u64::from(s)) + delta;
            if w.is_zero() || w < &Ratio::zero() || den <= Ratio::zero() {
                BoundaryDivisor::Infinite
            } else {
                BoundaryDivisor::Finite(w / den)
            }
        })
        .collect()
}

/// Pick a divisor strictly inside the open interval `(lower, upper)`, rounded
/// to the coarsest decimal precision possible.
///
/// Starts from the midpoint; for 0..=16 decimal digits, rounds the midpoint to
/// that precision and returns the first value that stays strictly inside the
/// interval; falls back to the raw midpoint.
pub fn find_clean_divisor(lower: &Ratio, upper: &Ratio) -> Ratio {
    debug_assert!(lower < upper);
    let mid = (lower + upper) / ratio_u64(2);
    for digits in 0..=16u32 {
        let candidate = round_to_decimals(&mid, digits);
        if &candidate > lower && &candidate < upper {
            return candidate;
        }
    }
    mid
}
