//! Lot-decision enumeration.
//!
//! Ties leave mathematically equivalent allocations; the law resolves them by
//! drawing lots among the enumerated candidates. This module produces that
//! candidate set:
//!
//! - Super tier: every distinct 0/1 vector over the tied units with exactly
//!   the disputed number of ones — `C(k, m)` candidates, no duplicates among
//!   interchangeable units.
//! - Sub tier: ties are per-cell within columns that still have unresolved
//!   seats; the candidate set is the cross-product of each column's local
//!   assignments, filtered to combinations whose per-row sums match that
//!   row's known deficit. The filter is constraint satisfaction, not
//!   optimization: every survivor is equally valid.
//!
//! Both sequences are lazy and restartable; nothing is materialized up front
//! except each column's small local set. Enumeration is refused outright past
//! the configured bounds instead of blowing up combinatorially.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

/// Errors refusing an enumeration before it starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LotError {
    /// More tied units than the configured enumeration bound.
    TooManyTiedUnits { tied: usize, max: u32 },
    /// Disputed seats exceed the tied-unit count; no assignment exists.
    InvalidDisputedCount { tied: usize, disputed: u32 },
    /// The sub-tier cross-product exceeds the enumeration bound.
    TooManyCombinations { combinations: u128, max: u128 },
}

impl fmt::Display for LotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LotError::TooManyTiedUnits { tied, max } => {
                write!(f, "{tied} tied units exceed the enumeration bound of {max}")
            }
            LotError::InvalidDisputedCount { tied, disputed } => {
                write!(f, "{disputed} disputed seats among {tied} tied units")
            }
            LotError::TooManyCombinations { combinations, max } => {
                write!(f, "{combinations} tie combinations exceed the bound of {max}")
            }
        }
    }
}

/// Upper bound on the sub-tier cross-product size.
const MAX_SUB_COMBINATIONS: u128 = 1 << 20;

/// Lazy enumeration of all 0/1 vectors of length `k` with exactly `m` ones,
/// in lexicographic order of the one-positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TieAssignments {
    tied: usize,
    disputed: usize,
    // Positions of the ones in the next vector; `None` once exhausted.
    positions: Option<Vec<usize>>,
}

impl TieAssignments {
    /// `tied_units` tie candidates contending for `disputed_seats` seats.
    pub fn new(tied_units: usize, disputed_seats: u32, max_tied_units: u32) -> Result<Self, LotError> {
        if tied_units as u64 > u64::from(max_tied_units) {
            return Err(LotError::TooManyTiedUnits { tied: tied_units, max: max_tied_units });
        }
        if disputed_seats as u64 > tied_units as u64 {
            return Err(LotError::InvalidDisputedCount { tied: tied_units, disputed: disputed_seats });
        }
        let disputed = disputed_seats as usize;
        Ok(Self {
            tied: tied_units,
            disputed,
            positions: Some((0..disputed).collect()),
        })
    }

    /// Number of candidates, `C(tied, disputed)`.
    pub fn count(&self) -> u128 {
        binomial(self.tied, self.disputed)
    }

    /// Rewind to the first candidate.
    pub fn restart(&mut self) {
        self.positions = Some((0..self.disputed).collect());
    }
}

impl Iterator for TieAssignments {
    type Item = Vec<bool>;

    fn next(&mut self) -> Option<Vec<bool>> {
        let mut positions = self.positions.take()?;

        let mut vector = alloc::vec![false; self.tied];
        for &p in &positions {
            vector[p] = true;
        }

        if next_combination(&mut positions, self.tied) {
            self.positions = Some(positions);
        }
        Some(vector)
    }
}

/// Advance `positions` to the next k-combination of `0..n`; false when done.
fn next_combination(positions: &mut [usize], n: usize) -> bool {
    let m = positions.len();
    let mut i = m;
    while i > 0 {
        i -= 1;
        if positions[i] < n - m + i {
            positions[i] += 1;
            for j in i + 1..m {
                positions[j] = positions[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

/// Exact binomial coefficient; inputs are bounded by the enumeration guard.
fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
    }
    acc
}

/// One column's open ties in the sub-apportionment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnTies {
    /// Column index within the sub-apportionment column set.
    pub column: usize,
    /// Rows of the tied cells, ascending.
    pub tied_rows: Vec<usize>,
    /// Seats of this column still open among those cells.
    pub disputed_seats: u32,
}

/// One sub-tier candidate: per tied cell, whether it keeps its provisionally
/// rounded-up seat. Keys are `(row, column)` within the sub-apportionment
/// index space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubLotCandidate {
    pub awards: BTreeMap<(usize, usize), bool>,
}

impl SubLotCandidate {
    /// Seats this candidate assigns within `row`.
    pub fn row_awards(&self, row: usize) -> u32 {
        self.awards
            .iter()
            .filter(|((r, _), &keep)| *r == row && keep)
            .count() as u32
    }
}

/// Lazy cross-product of per-column tie assignments, filtered by row deficits.
#[derive(Clone, Debug)]
pub struct SubLotAssignments {
    columns: Vec<ColumnTies>,
    row_deficits: BTreeMap<usize, u32>,
    // Each column's local candidate vectors, indexed by the odometer below.
    locals: Vec<Vec<Vec<bool>>>,
    cursor: Option<Vec<usize>>,
}

impl SubLotAssignments {
    /// `row_deficits` must cover every row of the sub-apportionment; rows
    /// without open ties carry a deficit of zero.
    pub fn new(
        columns: Vec<ColumnTies>,
        row_deficits: BTreeMap<usize, u32>,
        max_tied_units: u32,
    ) -> Result<Self, LotError> {
        let mut locals = Vec::with_capacity(columns.len());
        let mut combinations: u128 = 1;
        for col in &columns {
            let assignments = TieAssignments::new(col.tied_rows.len(), col.disputed_seats, max_tied_units)?;
            combinations = combinations.saturating_mul(TieAssignments::count(&assignments));
            if combinations > MAX_SUB_COMBINATIONS {
                return Err(LotError::TooManyCombinations {
                    combinations,
                    max: MAX_SUB_COMBINATIONS,
                });
            }
            locals.push(assignments.collect::<Vec<_>>());
        }
        let cursor = Some(alloc::vec![0usize; columns.len()]);
        Ok(Self { columns, row_deficits, locals, cursor })
    }

    /// Cross-product size before the row filter.
    pub fn unfiltered_count(&self) -> u128 {
        self.locals.iter().fold(1u128, |acc, l| acc.saturating_mul(l.len() as u128))
    }

    /// Rewind to the first candidate.
    pub fn restart(&mut self) {
        self.cursor = Some(alloc::vec![0usize; self.columns.len()]);
    }

    fn candidate_at(&self, cursor: &[usize]) -> SubLotCandidate {
        let mut awards = BTreeMap::new();
        for (ci, col) in self.columns.iter().enumerate() {
            let local = &self.locals[ci][cursor[ci]];
            for (pos, &row) in col.tied_rows.iter().enumerate() {
                awards.insert((row, col.column), local[pos]);
            }
        }
        SubLotCandidate { awards }
    }

    fn satisfies_row_deficits(&self, candidate: &SubLotCandidate) -> bool {
        let mut sums: BTreeMap<usize, u32> = BTreeMap::new();
        for ((row, _), &keep) in &candidate.awards {
            if keep {
                *sums.entry(*row).or_insert(0) += 1;
            }
        }
        self.row_deficits
            .iter()
            .all(|(row, &deficit)| sums.get(row).copied().unwrap_or(0) == deficit)
    }

    fn advance(&self, cursor: &mut [usize]) -> bool {
        let mut i = cursor.len();
        while i > 0 {
            i -= 1;
            cursor[i] += 1;
            if cursor[i] < self.locals[i].len() {
                return true;
            }
            cursor[i] = 0;
        }
        false
    }
}

impl Iterator for SubLotAssignments {
    type Item = SubLotCandidate;

    fn next(&mut self) -> Option<SubLotCandidate> {
        loop {
            let mut cursor = self.cursor.take()?;
            let candidate = self.candidate_at(&cursor);
            if self.advance(&mut cursor) {
                self.cursor = Some(cursor);
            }
            if self.satisfies_row_deficits(&candidate) {
                return Some(candidate);
            }
        }
    }
}
