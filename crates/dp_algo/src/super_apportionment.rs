//! Sainte-Laguë (Webster) divisor apportionment with exact tie detection.
//!
//! Contract:
//! - Allocate `target_seats` across units by a single shared divisor:
//!   `seats = round(weight / divisor)` with exact `n + 1/2` rounding **up**.
//! - Correct the divisor until the seat sum hits the target, walking the
//!   rounding-boundary divisors (`weight/(seats ± 1/2)`) instead of guessing.
//! - A tie exists when more units sit on the decisive boundary than there are
//!   seats left to move; those units are marked `Negative` and the disputed
//!   seats stay open for a lot decision. Ties are outcomes, not errors.
//! - Without ties, the published election key is a clean divisor strictly
//!   inside the interval that reproduces the allocation; with ties it is the
//!   last working divisor.
//!
//! Determinism:
//! - Exact rational arithmetic only; boundary comparisons are bit-exact.
//! - The correction loop threads an immutable `SearchState` through a bounded
//!   transition function, so the termination bound and the tie conditions are
//!   testable in isolation.

use alloc::vec::Vec;
use core::fmt;

use dp_core::rounding::{half, is_half_boundary, ratio_u64, round_half_up, round_half_up_u32, total, Ratio};
use dp_core::state::TieState;

use log::trace;
use num_traits::Zero;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::divisor::{boundary_divisors, find_clean_divisor, BoundaryDivisor};

/// Errors terminating a run without any committed seat counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// A target of zero seats has no allocation.
    InvalidTarget,
    /// The initial divisor `round(Σ weights / target)` is zero.
    ZeroDivisor,
    /// No unit can absorb another seat (all boundary divisors infinite).
    Infeasible,
    /// The correction loop did not converge within its bound.
    IterationCapExceeded { cap: u32 },
    /// A quotient left the representable seat range.
    SeatOverflow,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidTarget => write!(f, "target seat count is zero"),
            AllocError::ZeroDivisor => write!(f, "initial divisor rounded to zero"),
            AllocError::Infeasible => write!(f, "no unit can absorb another seat"),
            AllocError::IterationCapExceeded { cap } => {
                write!(f, "divisor correction exceeded {cap} iterations")
            }
            AllocError::SeatOverflow => write!(f, "quotient exceeds representable seat range"),
        }
    }
}

/// Per-unit outcome of one apportionment stage.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnitAllocation {
    /// Exact quotient `weight / election_key`.
    pub quotient: Ratio,
    /// Seat count; for `Negative` units this still includes the provisionally
    /// rounded-up boundary seat.
    pub seats: u32,
    pub tie_state: TieState,
}

/// Stage outcome: per-unit allocations plus the published election key.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SuperApportionment {
    pub units: Vec<UnitAllocation>,
    /// Canonical publishable divisor; the last working divisor while ties
    /// remain open.
    pub election_key: Ratio,
    /// Seats still disputed among the `Negative` units.
    pub undecided_seats: u32,
}

impl SuperApportionment {
    #[inline]
    pub fn has_ties(&self) -> bool {
        self.undecided_seats > 0
    }

    /// Indices of units awaiting the lot decision.
    pub fn tied_units(&self) -> Vec<usize> {
        self.units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.tie_state.is_tied())
            .map(|(i, _)| i)
            .collect()
    }

    /// Seats not under dispute: every held seat minus one per tied unit.
    pub fn confirmed_seats(&self) -> u32 {
        let held: u32 = self.units.iter().map(|u| u.seats).sum();
        let disputed = self.units.iter().filter(|u| u.tie_state.is_tied()).count() as u32;
        held.saturating_sub(disputed)
    }
}

/// Immutable snapshot threaded through the correction loop.
#[derive(Clone, Debug)]
struct SearchState {
    divisor: Ratio,
    seats: Vec<u32>,
}

/// One correction step: either done, stopped on a tie, or a new state.
enum Step {
    Converged(SearchState),
    Tied(SearchState),
    Continue(SearchState),
}

/// Allocate `target_seats` across `weights` and detect unresolvable ties.
///
/// `iteration_cap` bounds the correction loop; the run fails fast instead of
/// searching unboundedly.
pub fn compute_super_apportionment(
    weights: &[Ratio],
    target_seats: u32,
    iteration_cap: u32,
) -> Result<SuperApportionment, AllocError> {
    if target_seats == 0 {
        return Err(AllocError::InvalidTarget);
    }

    let weight_sum = total(weights.iter());
    let initial = Ratio::from_integer(round_half_up(&(weight_sum / ratio_u64(u64::from(target_seats)))));
    if initial.is_zero() {
        return Err(AllocError::ZeroDivisor);
    }

    let seats = allocate(weights, &initial)?;
    let mut state = SearchState { divisor: initial, seats };

    for _ in 0..iteration_cap {
        match correct(weights, target_seats, state)? {
            Step::Converged(s) => return Ok(finalize_unique(weights, target_seats, s)),
            Step::Tied(s) => return Ok(finalize_tied(weights, target_seats, s)),
            Step::Continue(s) => state = s,
        }
    }
    Err(AllocError::IterationCapExceeded { cap: iteration_cap })
}

/// Round every quotient at `divisor`; exact halves round up.
fn allocate(weights: &[Ratio], divisor: &Ratio) -> Result<Vec<u32>, AllocError> {
    weights
        .iter()
        .map(|w| round_half_up_u32(&(w / divisor)).ok_or(AllocError::SeatOverflow))
        .collect()
}

/// Single transition of the divisor search.
fn correct(weights: &[Ratio], target: u32, state: SearchState) -> Result<Step, AllocError> {
    let held: u64 = state.seats.iter().map(|&s| u64::from(s)).sum();
    let target = u64::from(target);

    if held == target {
        return Ok(Step::Converged(state));
    }

    // Over-allocated: the next divisor is the largest seat-keep boundary
    // `weight/(seats - 1/2)`; at that divisor the boundary units keep their
    // seat (halves round up) while every unit strictly below it loses.
    // Under-allocated: the next divisor is the largest seat-gain boundary
    // `weight/(seats + 1/2)` — the first one crossed as the divisor falls —
    // and the boundary units gain exactly one seat each.
    let delta = if held > target {
        -half()
    } else {
        half()
    };
    let bounds = boundary_divisors(weights, &state.seats, &delta);
    let (next, shared) = largest_finite(&bounds).ok_or(AllocError::Infeasible)?;

    let open = if held > target { held - target } else { target - held };
    let divisor = next.clone();
    let seats = allocate(weights, &divisor)?;

    if shared as u64 > open {
        trace!("{shared} units share boundary divisor {divisor} for {open} open seats: tie");
        return Ok(Step::Tied(SearchState { divisor, seats }));
    }
    trace!("seat sum {held} vs target {target}: adopting boundary divisor {divisor}");
    Ok(Step::Continue(SearchState { divisor, seats }))
}

/// Largest finite boundary divisor and how many units share it exactly.
fn largest_finite(bounds: &[BoundaryDivisor]) -> Option<(&Ratio, usize)> {
    let mut best: Option<&Ratio> = None;
    let mut shared = 0usize;
    for b in bounds {
        if let Some(d) = b.finite() {
            match best {
                None => {
                    best = Some(d);
                    shared = 1;
                }
                Some(cur) => {
                    if d > cur {
                        best = Some(d);
                        shared = 1;
                    } else if d == cur {
                        shared += 1;
                    }
                }
            }
        }
    }
    best.map(|d| (d, shared))
}

/// Tie-free outcome: publish a clean election key and reallocate cosmetically.
fn finalize_unique(weights: &[Ratio], target: u32, state: SearchState) -> SuperApportionment {
    let gain = boundary_divisors(weights, &state.seats, &half());
    let keep = boundary_divisors(weights, &state.seats, &(-half()));

    // The divisor interval reproducing this allocation is open at the largest
    // gain boundary and closed at the smallest keep boundary; any value
    // strictly between the two reproduces the seats.
    let lower = gain.iter().filter_map(BoundaryDivisor::finite).max();
    let upper = keep.iter().filter_map(BoundaryDivisor::finite).min();

    let key = match (lower, upper) {
        (Some(lo), Some(hi)) if lo < hi => find_clean_divisor(lo, hi),
        _ => state.divisor.clone(),
    };

    let units: Vec<UnitAllocation> = weights
        .iter()
        .zip(state.seats.iter())
        .map(|(w, &s)| UnitAllocation {
            quotient: w / &key,
            seats: s,
            tie_state: TieState::Unique,
        })
        .collect();

    debug_assert_eq!(
        units.iter().map(|u| u64::from(u.seats)).sum::<u64>(),
        u64::from(target)
    );

    SuperApportionment { units, election_key: key, undecided_seats: 0 }
}

/// Tied outcome: the election key is the last working divisor; every unit
/// sitting exactly on a rounding boundary is provisionally rounded up and
/// marked `Negative`.
fn finalize_tied(weights: &[Ratio], target: u32, state: SearchState) -> SuperApportionment {
    let units: Vec<UnitAllocation> = weights
        .iter()
        .zip(state.seats.iter())
        .map(|(w, &s)| {
            let quotient = w / &state.divisor;
            let tie_state = if is_half_boundary(&quotient) {
                TieState::Negative
            } else {
                TieState::Unique
            };
            UnitAllocation { quotient, seats: s, tie_state }
        })
        .collect();

    let held: u32 = units.iter().map(|u| u.seats).sum();
    let disputed = units.iter().filter(|u| u.tie_state.is_tied()).count() as u32;
    let undecided = target.saturating_sub(held.saturating_sub(disputed));

    SuperApportionment {
        units,
        election_key: state.divisor,
        undecided_seats: undecided,
    }
}
