//! dp_core — Core types, domains, and exact-rational arithmetic.
//!
//! This crate is **I/O-free**. It defines stable types/APIs used across the
//! engine (`dp_algo`, `dp_pipeline`).
//!
//! - Registry tokens: `ConstituencyId`, `ListId`
//! - Exact rational helpers (`Ratio` over arbitrary-precision integers)
//! - Tie-state domain shared by both apportionment tiers
//! - `Params`: quorum percentages and algorithm bounds
//!
//! All weights, divisors, and quotients are exact rationals. Binary floating
//! point must never enter a comparison: seat boundaries sit at exact
//! half-integer quotients and published divisors are part of an auditable
//! official result.
//!
//! Serialization derives are gated behind the `serde` feature.

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod errors {
    use core::fmt;

    /// Minimal error set for core-domain validation & parsing.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum CoreError {
        InvalidToken,
        InvalidRatio,
        DomainOutOfRange(&'static str),
    }

    impl fmt::Display for CoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                CoreError::InvalidToken => write!(f, "invalid token"),
                CoreError::InvalidRatio => write!(f, "invalid ratio"),
                CoreError::DomainOutOfRange(k) => write!(f, "domain out of range: {k}"),
            }
        }
    }
}

pub mod tokens {
    //! Registry token types (`ConstituencyId`, `ListId`) with strict charset.

    use crate::errors::CoreError;
    use alloc::string::{String, ToString};
    use core::fmt;
    use core::str::FromStr;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    fn is_token(s: &str) -> bool {
        let len = s.len();
        if !(1..=64).contains(&len) { return false; }
        s.bytes().all(|b| matches!(b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' |
            b'_' | b'-' | b':' | b'.'
        ))
    }

    macro_rules! def_token {
        ($name:ident) => {
            #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
            #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
            pub struct $name(String);

            impl $name {
                pub fn as_str(&self) -> &str { &self.0 }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
            }

            impl FromStr for $name {
                type Err = CoreError;
                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    if is_token(s) { Ok(Self(s.to_string())) } else { Err(CoreError::InvalidToken) }
                }
            }
        }
    }

    def_token!(ConstituencyId);
    def_token!(ListId);
}

pub mod rounding {
    //! Exact-rational helpers shared by both apportionment tiers.
    //!
    //! `Ratio` is an arbitrary-precision rational; helpers below cover the
    //! engine's whole numeric surface: checked construction, Sainte-Laguë
    //! rounding (exact `n + 1/2` rounds **up**), half-boundary detection, and
    //! decimal-precision rounding used to publish "clean" divisors.

    use crate::errors::CoreError;

    use num_bigint::BigInt;
    use num_traits::{One, Signed, ToPrimitive, Zero};

    /// Exact rational with arbitrary-precision numerator and denominator.
    pub type Ratio = num_rational::BigRational;

    /// Construct a ratio from machine integers, rejecting a zero denominator.
    pub fn ratio(num: i64, den: i64) -> Result<Ratio, CoreError> {
        if den == 0 { return Err(CoreError::InvalidRatio); }
        Ok(Ratio::new(BigInt::from(num), BigInt::from(den)))
    }

    /// Whole-number ratio from an unsigned count (vote totals, seat counts).
    #[inline]
    pub fn ratio_u64(n: u64) -> Ratio {
        Ratio::from_integer(BigInt::from(n))
    }

    /// Exactly one half.
    #[inline]
    pub fn half() -> Ratio {
        Ratio::new(BigInt::one(), BigInt::from(2))
    }

    /// Nearest-integer rounding with exact halves rounding **up**
    /// (the Sainte-Laguë/Webster tie-break): `floor(r + 1/2)`.
    pub fn round_half_up(r: &Ratio) -> BigInt {
        (r + half()).floor().to_integer()
    }

    /// `round_half_up` narrowed to a seat count. `None` if negative or too large.
    pub fn round_half_up_u32(r: &Ratio) -> Option<u32> {
        let i = round_half_up(r);
        if i.is_negative() { return None; }
        i.to_u32()
    }

    /// True iff `r` sits exactly on a rounding boundary `n + 1/2`.
    pub fn is_half_boundary(r: &Ratio) -> bool {
        let doubled = r * Ratio::from_integer(BigInt::from(2));
        doubled.is_integer() && !r.is_integer()
    }

    /// Round to `digits` decimal places, exactly: `floor(r·10^d + 1/2) / 10^d`.
    pub fn round_to_decimals(r: &Ratio, digits: u32) -> Ratio {
        let scale = num_traits::pow(BigInt::from(10), digits as usize);
        let scaled = r * Ratio::from_integer(scale.clone());
        Ratio::new(round_half_up(&scaled), scale)
    }

    /// Exact sum of a sequence of ratios.
    pub fn total<'a>(items: impl IntoIterator<Item = &'a Ratio>) -> Ratio {
        let mut acc = Ratio::zero();
        for r in items {
            acc += r;
        }
        acc
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn half_rounds_up() {
            let r = ratio(3, 2).unwrap(); // 1.5
            assert_eq!(round_half_up(&r), BigInt::from(2));
            let r = ratio(5, 2).unwrap(); // 2.5
            assert_eq!(round_half_up(&r), BigInt::from(3));
        }

        #[test]
        fn below_half_rounds_down() {
            let r = ratio(149, 100).unwrap();
            assert_eq!(round_half_up(&r), BigInt::from(1));
        }

        #[test]
        fn boundary_detection() {
            assert!(is_half_boundary(&ratio(1, 2).unwrap()));
            assert!(is_half_boundary(&ratio(7, 2).unwrap()));
            assert!(!is_half_boundary(&ratio(2, 1).unwrap()));
            assert!(!is_half_boundary(&ratio(1, 3).unwrap()));
        }

        #[test]
        fn decimal_rounding_is_exact() {
            let r = ratio(2000, 3).unwrap(); // 666.666…
            assert_eq!(round_to_decimals(&r, 0), ratio(667, 1).unwrap());
            assert_eq!(round_to_decimals(&r, 1), ratio(6667, 10).unwrap());
            assert_eq!(round_to_decimals(&r, 2), ratio(66667, 100).unwrap());
        }

        #[test]
        fn zero_denominator_rejected() {
            assert!(ratio(1, 0).is_err());
        }
    }
}

pub mod state {
    //! Tie-state domain shared by both apportionment tiers.

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    /// Outcome state of one allocated seat count.
    ///
    /// `Negative` marks a unit provisionally rounded **up** at an exact
    /// `n + 1/2` boundary; the disputed seat stays open until a lot decision
    /// picks which of the tied units keep theirs.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum TieState {
        Unique,
        Negative,
    }

    impl TieState {
        #[inline]
        pub fn is_tied(self) -> bool {
            matches!(self, TieState::Negative)
        }
    }
}

pub mod params {
    //! Computation parameters and their domains.
    //!
    //! Notes:
    //! - Quorum percentages are optional; an unconfigured threshold is simply
    //!   not applicable (a list passes if **either** applicable threshold is
    //!   met; with neither configured every list passes).
    //! - `correction_iteration_cap` bounds the divisor-correction loop; the
    //!   loop must fail fast instead of searching unboundedly.
    //! - `max_tied_units` bounds lot-decision enumeration before any
    //!   combination is generated.

    use crate::errors::CoreError;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct Params {
        /// Per-constituency quorum in percent: a list passes by reaching this
        /// share of the votes in at least one constituency.
        pub row_quorum_percent: Option<u8>,
        /// Union-wide (cantonal) quorum in percent of all votes cast.
        pub total_quorum_percent: Option<u8>,
        /// Hard bound on divisor-correction iterations per run.
        pub correction_iteration_cap: u32,
        /// Hard bound on tied units/cells admitted to lot enumeration.
        pub max_tied_units: u32,
    }

    impl Default for Params {
        fn default() -> Self {
            Self {
                row_quorum_percent: None,
                total_quorum_percent: None,
                correction_iteration_cap: 128,
                max_tied_units: 20,
            }
        }
    }

    impl Params {
        pub fn validate(&self) -> Result<(), CoreError> {
            if let Some(p) = self.row_quorum_percent {
                if p > 100 { return Err(CoreError::DomainOutOfRange("row_quorum_percent")); }
            }
            if let Some(p) = self.total_quorum_percent {
                if p > 100 { return Err(CoreError::DomainOutOfRange("total_quorum_percent")); }
            }
            if self.correction_iteration_cap == 0 {
                return Err(CoreError::DomainOutOfRange("correction_iteration_cap"));
            }
            if self.max_tied_units == 0 {
                return Err(CoreError::DomainOutOfRange("max_tied_units"));
            }
            Ok(())
        }
    }

}
