//! End-to-end orchestration tests against a scripted fitting engine.
//!
//! The biproportional engine is an external collaborator; these tests drive
//! the orchestrator with hand-fitted results whose divisors and seats were
//! worked out exactly on paper.

use std::collections::BTreeMap;
use std::str::FromStr;

use dp_algo::{
    BiproportionalEngine, BiproportionalError, BiproportionalFit, BiproportionalInput,
    SubLotCandidate, TieState,
};
use dp_core::params::Params;
use dp_core::rounding::{ratio, Ratio};
use dp_core::tokens::{ConstituencyId, ListId};
use dp_pipeline::{ConstituencyVotes, DoubleProportional, PipelineError, StageState};

fn r(n: i64) -> Ratio {
    ratio(n, 1).unwrap()
}

fn cid(s: &str) -> ConstituencyId {
    ConstituencyId::from_str(s).unwrap()
}

fn lid(s: &str) -> ListId {
    ListId::from_str(s).unwrap()
}

fn constituency(name: &str, seats: u32, votes: &[(&str, u64)]) -> ConstituencyVotes {
    ConstituencyVotes {
        id: cid(name),
        seat_target: seats,
        total_votes: votes.iter().map(|(_, v)| v).sum(),
        list_votes: votes.iter().map(|(l, v)| (lid(l), *v)).collect(),
    }
}

/// Replays one pre-fitted result regardless of input.
struct Scripted(BiproportionalFit);

impl BiproportionalEngine for Scripted {
    fn fit(&self, _input: &BiproportionalInput<'_>) -> Result<BiproportionalFit, BiproportionalError> {
        Ok(self.0.clone())
    }
}

struct Failing;

impl BiproportionalEngine for Failing {
    fn fit(&self, _input: &BiproportionalInput<'_>) -> Result<BiproportionalFit, BiproportionalError> {
        Err(BiproportionalError::Infeasible)
    }
}

fn unique(rows: usize, cols: usize) -> Vec<Vec<TieState>> {
    vec![vec![TieState::Unique; cols]; rows]
}

#[test]
fn clean_two_constituency_union_completes_both_tiers() {
    let input = vec![
        constituency("north", 2, &[("a", 1000), ("b", 600)]),
        constituency("south", 2, &[("a", 400), ("b", 1000)]),
    ];
    // Fitted on paper: one seat per cell, row divisors 800/700, columns at 1.
    let engine = Scripted(BiproportionalFit {
        cell_seats: vec![vec![1, 1], vec![1, 1]],
        cell_ties: unique(2, 2),
        row_divisors: vec![r(800), r(700)],
        col_divisors: vec![r(1), r(1)],
    });

    let dp = DoubleProportional::compute(&input, Params::default(), engine).unwrap();

    assert_eq!(dp.super_state(), StageState::Completed);
    assert_eq!(dp.sub_state(), StageState::Completed);

    let list_seats = dp.list_seats().unwrap();
    assert_eq!(list_seats[&lid("a")], 2);
    assert_eq!(list_seats[&lid("b")], 2);

    let sub = dp.sub_outcome().unwrap();
    assert_eq!(sub.row_divisors, vec![r(933), r(733)]);
    assert_eq!(sub.col_divisors, vec![r(1), r(1)]);

    let cells = dp.cell_seats().unwrap();
    assert_eq!(cells[&(cid("north"), lid("a"))], 1);
    assert_eq!(cells[&(cid("south"), lid("b"))], 1);
}

#[test]
fn single_constituency_matches_divisor_scenario() {
    // Voter weights 1000/900/100 for 3 seats: 2/1/0 with election key 633.
    let input = vec![constituency("metro", 3, &[("a", 3000), ("b", 2700), ("c", 300)])];
    let engine = Scripted(BiproportionalFit {
        cell_seats: vec![vec![2, 1]],
        cell_ties: unique(1, 2),
        row_divisors: vec![r(1900)],
        col_divisors: vec![r(1), r(1)],
    });

    let dp = DoubleProportional::compute(&input, Params::default(), engine).unwrap();

    let sup = dp.super_outcome().unwrap();
    assert_eq!(sup.allocation.election_key, r(633));
    assert!(!sup.allocation.has_ties());
    assert_eq!(sup.winning_columns(), vec![(0, 2), (1, 1)]);

    let list_seats = dp.list_seats().unwrap();
    assert_eq!(list_seats[&lid("a")], 2);
    assert_eq!(list_seats[&lid("b")], 1);
    assert_eq!(list_seats[&lid("c")], 0);

    assert_eq!(dp.sub_state(), StageState::Completed);
    let sub = dp.sub_outcome().unwrap();
    assert_eq!(sub.row_divisors, vec![r(1900)]);
    assert_eq!(sub.col_divisors, vec![r(1), r(2)]);
}

#[test]
fn super_tie_waits_for_lot_and_then_triggers_sub() {
    let input = vec![constituency("only", 1, &[("x", 500), ("y", 500)])];
    let engine = Scripted(BiproportionalFit {
        cell_seats: vec![vec![1]],
        cell_ties: unique(1, 1),
        row_divisors: vec![r(500)],
        col_divisors: vec![r(1)],
    });

    let mut dp = DoubleProportional::compute(&input, Params::default(), engine).unwrap();

    assert_eq!(dp.super_state(), StageState::AwaitingLotDecision);
    assert_eq!(dp.sub_state(), StageState::Pending);
    assert!(dp.list_seats().is_none());

    let sup = dp.super_outcome().unwrap();
    assert_eq!(sup.allocation.undecided_seats, 1);
    assert_eq!(sup.allocation.election_key, r(1000));
    assert_eq!(sup.allocation.units[0].quotient, ratio(1, 2).unwrap());

    let candidates: Vec<Vec<bool>> = dp.super_lot_candidates().unwrap().collect();
    assert_eq!(candidates, vec![vec![true, false], vec![false, true]]);

    // Invalid candidates are rejected without touching the stage.
    assert!(matches!(
        dp.set_super_apportionment_lot_decision(&[true, true]),
        Err(PipelineError::InvalidLotCandidate(_))
    ));
    assert!(matches!(
        dp.set_super_apportionment_lot_decision(&[true]),
        Err(PipelineError::InvalidLotCandidate(_))
    ));
    assert_eq!(dp.super_state(), StageState::AwaitingLotDecision);

    dp.set_super_apportionment_lot_decision(&[true, false]).unwrap();

    assert_eq!(dp.super_state(), StageState::Completed);
    assert_eq!(dp.sub_state(), StageState::Completed);

    let list_seats = dp.list_seats().unwrap();
    assert_eq!(list_seats[&lid("x")], 1);
    assert_eq!(list_seats[&lid("y")], 0);

    let cells = dp.cell_seats().unwrap();
    assert_eq!(cells[&(cid("only"), lid("x"))], 1);

    // The decision is spent; a second application has nothing to resolve.
    assert!(matches!(
        dp.set_super_apportionment_lot_decision(&[false, true]),
        Err(PipelineError::StageNotReady(_))
    ));
}

#[test]
fn sub_tie_enumerates_and_applies_lot_decision() {
    let input = vec![
        constituency("north", 2, &[("a", 1500), ("b", 500)]),
        constituency("south", 2, &[("a", 500), ("b", 1500)]),
    ];
    // Every cell sits exactly on a boundary: two competing fittings.
    let engine = Scripted(BiproportionalFit {
        cell_seats: vec![vec![2, 1], vec![1, 2]],
        cell_ties: vec![
            vec![TieState::Negative, TieState::Negative],
            vec![TieState::Negative, TieState::Negative],
        ],
        row_divisors: vec![r(1000), r(1000)],
        col_divisors: vec![r(1), r(1)],
    });

    let mut dp = DoubleProportional::compute(&input, Params::default(), engine).unwrap();

    assert_eq!(dp.super_state(), StageState::Completed);
    assert_eq!(dp.sub_state(), StageState::AwaitingLotDecision);
    assert!(dp.cell_seats().is_none());

    // Tied divisors are published as normalized, not cleaned.
    let sub = dp.sub_outcome().unwrap();
    assert_eq!(sub.row_divisors, vec![r(1000), r(1000)]);
    assert!(sub.has_open_ties());

    let candidates: Vec<SubLotCandidate> = dp.sub_lot_candidates().unwrap().collect();
    assert_eq!(candidates.len(), 2);

    // A candidate violating a column target is rejected.
    let bogus = SubLotCandidate {
        awards: [((0, 0), true), ((1, 0), true), ((0, 1), false), ((1, 1), false)]
            .into_iter()
            .collect(),
    };
    assert!(matches!(
        dp.set_sub_apportionment_lot_decision(&bogus),
        Err(PipelineError::InvalidLotCandidate(_))
    ));

    let chosen = candidates
        .iter()
        .find(|c| c.awards[&(0, 0)])
        .unwrap()
        .clone();
    dp.set_sub_apportionment_lot_decision(&chosen).unwrap();

    assert_eq!(dp.sub_state(), StageState::Completed);
    let cells = dp.cell_seats().unwrap();
    assert_eq!(cells[&(cid("north"), lid("a"))], 2);
    assert_eq!(cells[&(cid("north"), lid("b"))], 0);
    assert_eq!(cells[&(cid("south"), lid("a"))], 0);
    assert_eq!(cells[&(cid("south"), lid("b"))], 2);
}

#[test]
fn quorum_failure_excludes_list_but_keeps_it_in_the_matrix() {
    let input = vec![
        constituency("north", 2, &[("a", 900), ("b", 590), ("c", 10)]),
        constituency("south", 2, &[("a", 500), ("b", 980), ("c", 20)]),
    ];
    let params = Params {
        row_quorum_percent: Some(5),
        total_quorum_percent: Some(3),
        ..Params::default()
    };
    let engine = Scripted(BiproportionalFit {
        cell_seats: vec![vec![1, 1], vec![1, 1]],
        cell_ties: unique(2, 2),
        row_divisors: vec![r(800), r(700)],
        col_divisors: vec![r(1), r(1)],
    });

    let dp = DoubleProportional::compute(&input, params, engine).unwrap();

    assert!(!dp.quorum().columns[2].passed());
    assert_eq!(dp.matrix().columns()[2].total_votes, 30);

    assert_eq!(dp.super_state(), StageState::Completed);
    assert_eq!(dp.sub_state(), StageState::Completed);

    let list_seats = dp.list_seats().unwrap();
    assert_eq!(list_seats[&lid("a")], 2);
    assert_eq!(list_seats[&lid("b")], 2);
    assert_eq!(list_seats[&lid("c")], 0);

    let sub = dp.sub_outcome().unwrap();
    assert_eq!(sub.row_divisors, vec![r(890), r(827)]);
    assert_eq!(sub.col_divisors, vec![r(1), r(1)]);
}

#[test]
fn engine_failure_marks_sub_stage_error_only() {
    let input = vec![
        constituency("north", 2, &[("a", 1000), ("b", 600)]),
        constituency("south", 2, &[("a", 400), ("b", 1000)]),
    ];
    let dp = DoubleProportional::compute(&input, Params::default(), Failing).unwrap();

    assert_eq!(dp.super_state(), StageState::Completed);
    assert_eq!(dp.sub_state(), StageState::Error);
    assert!(matches!(
        dp.sub_error(),
        Some(PipelineError::Engine(BiproportionalError::Infeasible))
    ));
    // Prior work is intact.
    assert!(dp.list_seats().is_some());
    assert!(dp.cell_seats().is_none());
}

#[test]
fn irreproducible_fit_is_discarded_entirely() {
    let input = vec![
        constituency("north", 2, &[("a", 1000), ("b", 600)]),
        constituency("south", 2, &[("a", 400), ("b", 1000)]),
    ];
    // Row sums match the targets, but no divisor pair explains these cells.
    let engine = Scripted(BiproportionalFit {
        cell_seats: vec![vec![0, 2], vec![2, 0]],
        cell_ties: unique(2, 2),
        row_divisors: vec![r(800), r(700)],
        col_divisors: vec![r(1), r(1)],
    });

    let dp = DoubleProportional::compute(&input, Params::default(), engine).unwrap();

    assert_eq!(dp.sub_state(), StageState::Error);
    assert!(matches!(
        dp.sub_error(),
        Some(PipelineError::SelectDivisors(_))
    ));
    assert!(dp.cell_seats().is_none());
}

#[test]
fn all_zero_votes_fail_the_super_apportionment() {
    let input = vec![constituency("north", 2, &[("a", 0), ("b", 0)])];
    let dp = DoubleProportional::compute(&input, Params::default(), Failing).unwrap();

    assert_eq!(dp.super_state(), StageState::Error);
    assert_eq!(dp.sub_state(), StageState::Pending);
    assert!(matches!(
        dp.super_error(),
        Some(PipelineError::SuperApportionment(dp_algo::AllocError::ZeroDivisor))
    ));
    assert!(dp.list_seats().is_none());
}

#[test]
fn lot_queries_on_settled_stages_are_rejected() {
    let input = vec![
        constituency("north", 2, &[("a", 1000), ("b", 600)]),
        constituency("south", 2, &[("a", 400), ("b", 1000)]),
    ];
    let engine = Scripted(BiproportionalFit {
        cell_seats: vec![vec![1, 1], vec![1, 1]],
        cell_ties: unique(2, 2),
        row_divisors: vec![r(800), r(700)],
        col_divisors: vec![r(1), r(1)],
    });
    let dp = DoubleProportional::compute(&input, Params::default(), engine).unwrap();

    assert!(matches!(
        dp.super_lot_candidates(),
        Err(PipelineError::StageNotReady(_))
    ));
    assert!(matches!(
        dp.sub_lot_candidates(),
        Err(PipelineError::StageNotReady(_))
    ));
}
