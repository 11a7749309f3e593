//! Result matrix: constituencies × lists with fixed structure.
//!
//! Row and column counts are fixed by the election data and never change
//! after construction. Row cell-sums equal the declared row totals and column
//! totals are derived from the cells, so the sum invariants hold by
//! construction for the lifetime of the matrix.

use std::collections::{BTreeMap, BTreeSet};

use dp_core::tokens::{ConstituencyId, ListId};

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("no constituencies supplied")]
    Empty,
    #[error("no lists supplied")]
    NoLists,
    #[error("duplicate constituency {0}")]
    DuplicateConstituency(ConstituencyId),
    #[error("constituency {id} declares {declared} votes but its lists sum to {observed}")]
    RowTotalMismatch { id: ConstituencyId, declared: u64, observed: u64 },
    #[error("constituency {0} has a zero seat target")]
    ZeroSeatTarget(ConstituencyId),
}

/// Per-constituency input: seat target, declared ballot total, votes per list.
#[derive(Clone, Debug)]
pub struct ConstituencyVotes {
    pub id: ConstituencyId,
    pub seat_target: u32,
    /// Declared total; checked against the list votes at build time.
    pub total_votes: u64,
    pub list_votes: BTreeMap<ListId, u64>,
}

/// One matrix row (constituency).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowInfo {
    pub id: ConstituencyId,
    pub seat_target: u32,
    pub total_votes: u64,
}

/// One matrix column (list group).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub id: ListId,
    pub total_votes: u64,
}

/// Rectangular vote matrix with derived totals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultMatrix {
    rows: Vec<RowInfo>,
    columns: Vec<ColumnInfo>,
    // Row-major; cells[r][c] are the raw votes of list c in constituency r.
    cells: Vec<Vec<u64>>,
}

impl ResultMatrix {
    pub fn build(input: &[ConstituencyVotes]) -> Result<Self, MatrixError> {
        if input.is_empty() {
            return Err(MatrixError::Empty);
        }

        // Canonical column order: lexicographic over the union of list ids.
        let column_ids: BTreeSet<ListId> = input
            .iter()
            .flat_map(|c| c.list_votes.keys().cloned())
            .collect();
        if column_ids.is_empty() {
            return Err(MatrixError::NoLists);
        }
        let column_ids: Vec<ListId> = column_ids.into_iter().collect();

        let mut seen: BTreeSet<ConstituencyId> = BTreeSet::new();
        let mut rows = Vec::with_capacity(input.len());
        let mut cells = Vec::with_capacity(input.len());
        let mut column_totals = vec![0u64; column_ids.len()];

        for constituency in input {
            if !seen.insert(constituency.id.clone()) {
                return Err(MatrixError::DuplicateConstituency(constituency.id.clone()));
            }
            if constituency.seat_target == 0 {
                return Err(MatrixError::ZeroSeatTarget(constituency.id.clone()));
            }

            let row: Vec<u64> = column_ids
                .iter()
                .map(|id| constituency.list_votes.get(id).copied().unwrap_or(0))
                .collect();
            let observed: u64 = row.iter().sum();
            if observed != constituency.total_votes {
                return Err(MatrixError::RowTotalMismatch {
                    id: constituency.id.clone(),
                    declared: constituency.total_votes,
                    observed,
                });
            }
            for (c, &v) in row.iter().enumerate() {
                column_totals[c] += v;
            }

            rows.push(RowInfo {
                id: constituency.id.clone(),
                seat_target: constituency.seat_target,
                total_votes: observed,
            });
            cells.push(row);
        }

        let columns = column_ids
            .into_iter()
            .zip(column_totals)
            .map(|(id, total_votes)| ColumnInfo { id, total_votes })
            .collect();

        Ok(Self { rows, columns, cells })
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[RowInfo] {
        &self.rows
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    #[inline]
    pub fn votes(&self, row: usize, column: usize) -> u64 {
        self.cells[row][column]
    }

    pub fn grand_total(&self) -> u64 {
        self.rows.iter().map(|r| r.total_votes).sum()
    }

    /// Seats to distribute overall: the sum of all row seat targets.
    pub fn total_seats(&self) -> u32 {
        self.rows.iter().map(|r| r.seat_target).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn id(s: &str) -> ConstituencyId {
        ConstituencyId::from_str(s).unwrap()
    }

    fn list(s: &str) -> ListId {
        ListId::from_str(s).unwrap()
    }

    fn constituency(name: &str, seats: u32, votes: &[(&str, u64)]) -> ConstituencyVotes {
        let list_votes: BTreeMap<ListId, u64> =
            votes.iter().map(|(l, v)| (list(l), *v)).collect();
        let total_votes = votes.iter().map(|(_, v)| v).sum();
        ConstituencyVotes { id: id(name), seat_target: seats, total_votes, list_votes }
    }

    #[test]
    fn totals_are_consistent() {
        let m = ResultMatrix::build(&[
            constituency("north", 2, &[("a", 100), ("b", 50)]),
            constituency("south", 3, &[("a", 30), ("c", 70)]),
        ])
        .unwrap();

        assert_eq!(m.row_count(), 2);
        assert_eq!(m.column_count(), 3); // a, b, c in canonical order
        assert_eq!(m.columns()[0].id, list("a"));
        assert_eq!(m.columns()[0].total_votes, 130);
        assert_eq!(m.votes(1, 2), 70);
        assert_eq!(m.votes(1, 1), 0); // absent list counts as zero
        assert_eq!(m.grand_total(), 250);
        assert_eq!(m.total_seats(), 5);
    }

    #[test]
    fn declared_total_mismatch_is_rejected() {
        let mut bad = constituency("north", 2, &[("a", 100)]);
        bad.total_votes = 99;
        assert!(matches!(
            ResultMatrix::build(&[bad]),
            Err(MatrixError::RowTotalMismatch { .. })
        ));
    }

    #[test]
    fn duplicate_constituency_is_rejected() {
        let a = constituency("north", 2, &[("a", 10)]);
        let b = constituency("north", 1, &[("a", 20)]);
        assert_eq!(
            ResultMatrix::build(&[a, b]),
            Err(MatrixError::DuplicateConstituency(id("north")))
        );
    }

    #[test]
    fn zero_seat_target_is_rejected() {
        let c = constituency("north", 0, &[("a", 10)]);
        assert!(matches!(
            ResultMatrix::build(&[c]),
            Err(MatrixError::ZeroSeatTarget(_))
        ));
    }
}
