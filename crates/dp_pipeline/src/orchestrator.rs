//! The double-proportional orchestrator.
//!
//! Owns one computation for an election union: builds the matrix and quorum
//! flags, runs the super-apportionment over the admitted lists using
//! voter-equivalent weights, delegates the sub-apportionment to the external
//! fitting engine, reconciles published divisors, and applies lot decisions.
//!
//! Stage lifecycle per tier: pending → completed | awaiting lot decision →
//! completed | error. Ties are modeled outcomes requiring external human
//! input; the computation resumes exactly at the recorded point without
//! redoing prior work. Fatal conditions mark the stage `Error` and commit
//! nothing. The sub-apportionment is gated on the super-apportionment being
//! final and is triggered automatically once it becomes so.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use dp_core::params::Params;
use dp_core::rounding::Ratio;
use dp_core::state::TieState;
use dp_core::tokens::{ConstituencyId, ListId};

use dp_algo::{
    compute_super_apportionment, BiproportionalEngine, BiproportionalError, BiproportionalInput,
    ColumnTies, SubLotAssignments, SubLotCandidate, SuperApportionment, TieAssignments,
};

use log::debug;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::matrix::{ConstituencyVotes, ResultMatrix};
use crate::quorum::{self, QuorumAssessment};
use crate::select_divisors;
use crate::PipelineError;

/// Externally visible state of one apportionment tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageState {
    Pending,
    AwaitingLotDecision,
    Completed,
    Error,
}

/// Super-apportionment outcome over the quorum-admitted lists.
#[derive(Clone, Debug)]
pub struct SuperOutcome {
    /// Matrix column indices admitted by the quorum, in matrix order;
    /// parallel to `allocation.units`.
    pub participants: Vec<usize>,
    pub allocation: SuperApportionment,
}

impl SuperOutcome {
    /// Matrix columns holding at least one seat, with their seat counts.
    pub fn winning_columns(&self) -> Vec<(usize, u32)> {
        self.participants
            .iter()
            .zip(self.allocation.units.iter())
            .filter(|(_, u)| u.seats > 0)
            .map(|(&c, u)| (c, u.seats))
            .collect()
    }
}

/// Sub-apportionment outcome over rows × seat-winning columns.
///
/// All indices below live in the sub-apportionment space: rows are matrix
/// rows, columns index `columns` (which maps back to matrix columns).
#[derive(Clone, Debug)]
pub struct SubOutcome {
    pub columns: Vec<usize>,
    pub col_targets: Vec<u32>,
    /// Per-cell seats; tied cells keep their provisionally rounded-up seat
    /// until the lot decision lands.
    pub cell_seats: Vec<Vec<u32>>,
    pub cell_ties: Vec<Vec<TieState>>,
    /// Published divisors (normalized; clean when the fit had no ties).
    pub row_divisors: Vec<Ratio>,
    pub col_divisors: Vec<Ratio>,
}

impl SubOutcome {
    pub fn has_open_ties(&self) -> bool {
        self.cell_ties.iter().any(|row| row.iter().any(|t| t.is_tied()))
    }
}

enum SuperStage {
    AwaitingLot(SuperOutcome),
    Completed(SuperOutcome),
    Failed(PipelineError),
}

enum SubStage {
    Pending,
    AwaitingLot(SubOutcome),
    Completed(SubOutcome),
    Failed(PipelineError),
}

/// One double-proportional computation, owned exclusively by its creator.
pub struct DoubleProportional<E> {
    engine: E,
    params: Params,
    matrix: ResultMatrix,
    quorum: QuorumAssessment,
    super_stage: SuperStage,
    sub_stage: SubStage,
}

impl<E: BiproportionalEngine> DoubleProportional<E> {
    /// Build the matrix, evaluate quorums, and run the allocation as far as
    /// open lot decisions allow.
    ///
    /// Input errors surface as `Err`; algorithmic failures are recorded on
    /// the affected stage instead, leaving prior stages intact.
    pub fn compute(
        input: &[ConstituencyVotes],
        params: Params,
        engine: E,
    ) -> Result<Self, PipelineError> {
        params.validate().map_err(PipelineError::Params)?;
        let matrix = ResultMatrix::build(input)?;
        let quorum = quorum::assess(&matrix, &params);

        let participants = quorum.admitted_columns();
        let weights: Vec<Ratio> = participants
            .iter()
            .map(|&c| voter_weight(&matrix, c))
            .collect();
        let target = matrix.total_seats();
        debug!(
            "super-apportionment: {} of {} lists admitted, {target} seats",
            participants.len(),
            matrix.column_count()
        );

        let super_stage =
            match compute_super_apportionment(&weights, target, params.correction_iteration_cap) {
                Ok(allocation) if allocation.has_ties() => {
                    debug!(
                        "super-apportionment awaiting lot decision: {} seats undecided",
                        allocation.undecided_seats
                    );
                    SuperStage::AwaitingLot(SuperOutcome { participants, allocation })
                }
                Ok(allocation) => SuperStage::Completed(SuperOutcome { participants, allocation }),
                Err(e) => SuperStage::Failed(PipelineError::SuperApportionment(e)),
            };

        let mut this = Self {
            engine,
            params,
            matrix,
            quorum,
            super_stage,
            sub_stage: SubStage::Pending,
        };
        if matches!(this.super_stage, SuperStage::Completed(_)) {
            this.run_sub();
        }
        Ok(this)
    }

    // ----------------------------- lot decisions -----------------------------

    /// Candidate set for the open super-apportionment lot decision.
    ///
    /// Candidate entries align with [`SuperApportionment::tied_units`] order.
    pub fn super_lot_candidates(&self) -> Result<TieAssignments, PipelineError> {
        match &self.super_stage {
            SuperStage::AwaitingLot(o) => TieAssignments::new(
                o.allocation.tied_units().len(),
                o.allocation.undecided_seats,
                self.params.max_tied_units,
            )
            .map_err(PipelineError::Lot),
            _ => Err(PipelineError::StageNotReady(
                "super-apportionment has no open lot decision",
            )),
        }
    }

    /// Apply the chosen candidate: each tied unit keeps its provisionally
    /// rounded-up seat iff its entry is true. Completing the
    /// super-apportionment triggers the sub-apportionment.
    pub fn set_super_apportionment_lot_decision(
        &mut self,
        keep: &[bool],
    ) -> Result<(), PipelineError> {
        {
            let o = match &self.super_stage {
                SuperStage::AwaitingLot(o) => o,
                _ => {
                    return Err(PipelineError::StageNotReady(
                        "super-apportionment has no open lot decision",
                    ))
                }
            };
            let tied = o.allocation.tied_units();
            if keep.len() != tied.len() {
                return Err(PipelineError::InvalidLotCandidate(
                    "candidate length does not match the tied units",
                ));
            }
            let kept = keep.iter().filter(|&&k| k).count() as u32;
            if kept != o.allocation.undecided_seats {
                return Err(PipelineError::InvalidLotCandidate(
                    "candidate does not assign exactly the disputed seats",
                ));
            }
        }

        if let Some(mut o) = self.take_super_awaiting() {
            let tied = o.allocation.tied_units();
            for (&unit, &kept) in tied.iter().zip(keep.iter()) {
                if !kept {
                    o.allocation.units[unit].seats -= 1;
                }
            }
            o.allocation.undecided_seats = 0;
            debug_assert_eq!(
                o.allocation.units.iter().map(|u| u.seats).sum::<u32>(),
                self.matrix.total_seats()
            );
            debug!("super-apportionment lot decision applied");
            self.super_stage = SuperStage::Completed(o);
            self.run_sub();
            Ok(())
        } else {
            Err(PipelineError::StageNotReady(
                "super-apportionment has no open lot decision",
            ))
        }
    }

    /// Candidate set for the open sub-apportionment lot decision.
    pub fn sub_lot_candidates(&self) -> Result<SubLotAssignments, PipelineError> {
        match &self.sub_stage {
            SubStage::AwaitingLot(o) => {
                let (columns, deficits) = sub_tie_context(o, &self.row_targets());
                SubLotAssignments::new(columns, deficits, self.params.max_tied_units)
                    .map_err(PipelineError::Lot)
            }
            _ => Err(PipelineError::StageNotReady(
                "sub-apportionment has no open lot decision",
            )),
        }
    }

    /// Apply the chosen candidate: each tied cell keeps its provisionally
    /// rounded-up seat iff its award is true.
    pub fn set_sub_apportionment_lot_decision(
        &mut self,
        candidate: &SubLotCandidate,
    ) -> Result<(), PipelineError> {
        {
            let o = match &self.sub_stage {
                SubStage::AwaitingLot(o) => o,
                _ => {
                    return Err(PipelineError::StageNotReady(
                        "sub-apportionment has no open lot decision",
                    ))
                }
            };
            let (columns, deficits) = sub_tie_context(o, &self.row_targets());

            let expected: BTreeSet<(usize, usize)> = columns
                .iter()
                .flat_map(|ct| ct.tied_rows.iter().map(|&r| (r, ct.column)))
                .collect();
            let addressed: BTreeSet<(usize, usize)> = candidate.awards.keys().copied().collect();
            if addressed != expected {
                return Err(PipelineError::InvalidLotCandidate(
                    "candidate does not address exactly the tied cells",
                ));
            }
            for ct in &columns {
                let kept = ct
                    .tied_rows
                    .iter()
                    .filter(|&&r| candidate.awards[&(r, ct.column)])
                    .count() as u32;
                if kept != ct.disputed_seats {
                    return Err(PipelineError::InvalidLotCandidate(
                        "candidate misses a column seat target",
                    ));
                }
            }
            for (&row, &deficit) in &deficits {
                if candidate.row_awards(row) != deficit {
                    return Err(PipelineError::InvalidLotCandidate(
                        "candidate misses a row seat target",
                    ));
                }
            }
        }

        if let Some(mut o) = self.take_sub_awaiting() {
            for ((r, c), &kept) in &candidate.awards {
                if !kept {
                    o.cell_seats[*r][*c] -= 1;
                }
            }
            debug_assert!(sub_conservation_holds(&o, &self.row_targets()));
            debug!("sub-apportionment lot decision applied");
            self.sub_stage = SubStage::Completed(o);
            Ok(())
        } else {
            Err(PipelineError::StageNotReady(
                "sub-apportionment has no open lot decision",
            ))
        }
    }

    // ------------------------------- accessors -------------------------------

    pub fn matrix(&self) -> &ResultMatrix {
        &self.matrix
    }

    pub fn quorum(&self) -> &QuorumAssessment {
        &self.quorum
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn super_state(&self) -> StageState {
        match &self.super_stage {
            SuperStage::AwaitingLot(_) => StageState::AwaitingLotDecision,
            SuperStage::Completed(_) => StageState::Completed,
            SuperStage::Failed(_) => StageState::Error,
        }
    }

    pub fn sub_state(&self) -> StageState {
        match &self.sub_stage {
            SubStage::Pending => StageState::Pending,
            SubStage::AwaitingLot(_) => StageState::AwaitingLotDecision,
            SubStage::Completed(_) => StageState::Completed,
            SubStage::Failed(_) => StageState::Error,
        }
    }

    pub fn super_outcome(&self) -> Option<&SuperOutcome> {
        match &self.super_stage {
            SuperStage::AwaitingLot(o) | SuperStage::Completed(o) => Some(o),
            SuperStage::Failed(_) => None,
        }
    }

    pub fn sub_outcome(&self) -> Option<&SubOutcome> {
        match &self.sub_stage {
            SubStage::AwaitingLot(o) | SubStage::Completed(o) => Some(o),
            _ => None,
        }
    }

    pub fn super_error(&self) -> Option<&PipelineError> {
        match &self.super_stage {
            SuperStage::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn sub_error(&self) -> Option<&PipelineError> {
        match &self.sub_stage {
            SubStage::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Final per-list seat totals once the super-apportionment is complete;
    /// lists outside the quorum (or without seats) report zero.
    pub fn list_seats(&self) -> Option<BTreeMap<ListId, u32>> {
        let o = match &self.super_stage {
            SuperStage::Completed(o) => o,
            _ => return None,
        };
        let mut seats: BTreeMap<ListId, u32> = self
            .matrix
            .columns()
            .iter()
            .map(|c| (c.id.clone(), 0))
            .collect();
        for (&col, unit) in o.participants.iter().zip(o.allocation.units.iter()) {
            seats.insert(self.matrix.columns()[col].id.clone(), unit.seats);
        }
        Some(seats)
    }

    /// Final per-cell seats once the sub-apportionment is complete.
    pub fn cell_seats(&self) -> Option<BTreeMap<(ConstituencyId, ListId), u32>> {
        let o = match &self.sub_stage {
            SubStage::Completed(o) => o,
            _ => return None,
        };
        let mut out = BTreeMap::new();
        for (r, row) in self.matrix.rows().iter().enumerate() {
            for (local, &col) in o.columns.iter().enumerate() {
                out.insert(
                    (row.id.clone(), self.matrix.columns()[col].id.clone()),
                    o.cell_seats[r][local],
                );
            }
        }
        Some(out)
    }

    // ------------------------------- internals -------------------------------

    fn row_targets(&self) -> Vec<u32> {
        self.matrix.rows().iter().map(|r| r.seat_target).collect()
    }

    /// Delegate to the fitting engine and reconcile published divisors.
    fn run_sub(&mut self) {
        let outcome = match &self.super_stage {
            SuperStage::Completed(o) => o,
            _ => return,
        };

        let winning = outcome.winning_columns();
        let columns: Vec<usize> = winning.iter().map(|&(c, _)| c).collect();
        let col_targets: Vec<u32> = winning.iter().map(|&(_, s)| s).collect();
        let rows = self.matrix.row_count();
        let votes: Vec<Vec<u64>> = (0..rows)
            .map(|r| columns.iter().map(|&c| self.matrix.votes(r, c)).collect())
            .collect();
        let row_targets = self.row_targets();
        debug!(
            "sub-apportionment: {} rows × {} seat-winning lists",
            rows,
            columns.len()
        );

        let input = BiproportionalInput {
            votes: &votes,
            row_targets: &row_targets,
            col_targets: &col_targets,
        };
        let fit = match self.engine.fit(&input) {
            Ok(fit) => fit,
            Err(e) => {
                self.sub_stage = SubStage::Failed(PipelineError::Engine(e));
                return;
            }
        };
        if !fit.shape_matches(rows, columns.len()) {
            self.sub_stage =
                SubStage::Failed(PipelineError::Engine(BiproportionalError::ShapeMismatch));
            return;
        }

        let has_ties = fit.has_ties();
        match select_divisors::publish(
            &votes,
            &fit.cell_seats,
            &fit.row_divisors,
            &fit.col_divisors,
            !has_ties,
        ) {
            Err(e) => {
                // A mismatch means the published divisors would not explain
                // the committed seats: discard everything.
                self.sub_stage = SubStage::Failed(PipelineError::SelectDivisors(e));
            }
            Ok(published) => {
                let out = SubOutcome {
                    columns,
                    col_targets,
                    cell_seats: fit.cell_seats,
                    cell_ties: fit.cell_ties,
                    row_divisors: published.row_divisors,
                    col_divisors: published.col_divisors,
                };
                if has_ties {
                    debug!("sub-apportionment awaiting lot decision");
                    self.sub_stage = SubStage::AwaitingLot(out);
                } else if !sub_conservation_holds(&out, &row_targets) {
                    self.sub_stage = SubStage::Failed(PipelineError::Conservation(
                        "sub-apportionment row/column totals do not meet their targets",
                    ));
                } else {
                    self.sub_stage = SubStage::Completed(out);
                }
            }
        }
    }

    fn take_super_awaiting(&mut self) -> Option<SuperOutcome> {
        if matches!(self.super_stage, SuperStage::AwaitingLot(_)) {
            let taken = mem::replace(
                &mut self.super_stage,
                SuperStage::Failed(PipelineError::StageNotReady("lot application in progress")),
            );
            if let SuperStage::AwaitingLot(o) = taken {
                return Some(o);
            }
        }
        None
    }

    fn take_sub_awaiting(&mut self) -> Option<SubOutcome> {
        if matches!(self.sub_stage, SubStage::AwaitingLot(_)) {
            let taken = mem::replace(
                &mut self.sub_stage,
                SubStage::Failed(PipelineError::StageNotReady("lot application in progress")),
            );
            if let SubStage::AwaitingLot(o) = taken {
                return Some(o);
            }
        }
        None
    }
}

/// Voter-equivalent weight of one list: `Σ votes / constituency seat target`
/// over all constituencies (biproportional normalization, not raw votes).
fn voter_weight(matrix: &ResultMatrix, column: usize) -> Ratio {
    let mut acc = Ratio::zero();
    for (r, row) in matrix.rows().iter().enumerate() {
        let votes = matrix.votes(r, column);
        if votes > 0 {
            acc += Ratio::new(BigInt::from(votes), BigInt::from(u64::from(row.seat_target)));
        }
    }
    acc
}

/// Open ties per column plus the per-row deficits they must cover.
fn sub_tie_context(
    out: &SubOutcome,
    row_targets: &[u32],
) -> (Vec<ColumnTies>, BTreeMap<usize, u32>) {
    let rows = out.cell_seats.len();

    let mut columns = Vec::new();
    for (c, &target) in out.col_targets.iter().enumerate() {
        let tied_rows: Vec<usize> = (0..rows)
            .filter(|&r| out.cell_ties[r][c].is_tied())
            .collect();
        if tied_rows.is_empty() {
            continue;
        }
        let held: u32 = (0..rows).map(|r| out.cell_seats[r][c]).sum();
        let confirmed = held.saturating_sub(tied_rows.len() as u32);
        columns.push(ColumnTies {
            column: c,
            tied_rows,
            disputed_seats: target.saturating_sub(confirmed),
        });
    }

    let mut deficits = BTreeMap::new();
    for r in 0..rows {
        let held: u32 = out.cell_seats[r].iter().sum();
        let tied = out.cell_ties[r].iter().filter(|t| t.is_tied()).count() as u32;
        let confirmed = held.saturating_sub(tied);
        deficits.insert(r, row_targets[r].saturating_sub(confirmed));
    }

    (columns, deficits)
}

fn sub_conservation_holds(out: &SubOutcome, row_targets: &[u32]) -> bool {
    let rows_ok = out
        .cell_seats
        .iter()
        .zip(row_targets.iter())
        .all(|(row, &target)| row.iter().sum::<u32>() == target);
    let cols_ok = out.col_targets.iter().enumerate().all(|(c, &target)| {
        out.cell_seats.iter().map(|row| row[c]).sum::<u32>() == target
    });
    rows_ok && cols_ok
}
