// crates/dp_algo/src/lib.rs
#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

// Core numerics and shared domains
pub use dp_core::rounding::Ratio;
pub use dp_core::state::TieState;

// ----------------------------- Algorithm modules -----------------------------

pub mod divisor;
pub mod super_apportionment;
pub mod biproportional;
pub mod lot;

// Tight, explicit re-exports (avoid wildcard export drift).
pub use divisor::{boundary_divisors, find_clean_divisor, BoundaryDivisor};
pub use super_apportionment::{
    compute_super_apportionment, AllocError, SuperApportionment, UnitAllocation,
};
pub use biproportional::{
    BiproportionalEngine, BiproportionalError, BiproportionalFit, BiproportionalInput,
};
pub use lot::{
    ColumnTies, LotError, SubLotAssignments, SubLotCandidate, TieAssignments,
};
