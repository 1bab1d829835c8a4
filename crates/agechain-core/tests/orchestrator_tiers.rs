//! # Orchestrator Tier Tests (T0-T4)
//!
//! If ANY tier fails, chained results cannot be trusted.
//!
//! ## Tiers
//! - T0: Chain Shape & Lineage
//! - T1: Cycle Numbering & Metrics
//! - T2: Failure Semantics
//! - T3: Shape Errors Before Indexing
//! - T4: Surrogate Aging

use agechain_core::primitives::DISCHARGE_CAPACITY;
use agechain_core::{
    ChainError, ChainRole, ChainRunner, CycleChain, CycleNumbering, Experiment, MetricSpec,
    Reduction, RoleLabel, SimulationEngine, SimulationSetup, Solution, SolutionKey, SolveError,
    SolveRequest, StepRecord, StopReason, extract_cycle_metric,
};
use std::cell::Cell;

// =============================================================================
// STUB ENGINE
// =============================================================================

/// Engine returning fixed-shape solutions: every cycle is a two-sample
/// "charge" step and a "discharge" step whose capacity reads 5, 4, 3, 2.
struct StubEngine {
    calls: Cell<usize>,
    fail_at: Option<usize>,
    cycles_override: Option<usize>,
}

impl StubEngine {
    fn new() -> Self {
        Self {
            calls: Cell::new(0),
            fail_at: None,
            cycles_override: None,
        }
    }

    fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::new()
        }
    }

    fn short(cycles: usize) -> Self {
        Self {
            cycles_override: Some(cycles),
            ..Self::new()
        }
    }
}

fn engine_error(e: ChainError) -> SolveError {
    SolveError::Engine(e.to_string())
}

impl SimulationEngine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    fn solve(&self, request: &SolveRequest<'_>) -> Result<Solution, SolveError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_at == Some(call) {
            return Err(SolveError::SolverNonConvergence(format!("call {}", call)));
        }

        let cycles = self
            .cycles_override
            .unwrap_or(request.experiment.cycle_count());
        let mut t = request
            .starting_solution
            .and_then(Solution::time_span)
            .map_or(0.0, |(_, end)| end);

        let mut builder = Solution::builder();
        for _ in 0..cycles {
            builder.start_cycle().map_err(engine_error)?;
            builder
                .push_step(
                    StepRecord::new("charge")
                        .with_time(vec![t, t + 1.0])
                        .with_series(DISCHARGE_CAPACITY, vec![2.0, 2.0]),
                )
                .map_err(engine_error)?;
            builder
                .push_step(
                    StepRecord::new("discharge")
                        .with_time(vec![t + 1.0, t + 2.0, t + 3.0, t + 4.0])
                        .with_series(DISCHARGE_CAPACITY, vec![5.0, 4.0, 3.0, 2.0]),
                )
                .map_err(engine_error)?;
            t += 4.0;
        }
        builder.build().map_err(engine_error)
    }
}

fn protocol(cycles: usize) -> Experiment {
    Experiment::parse(&[&["Charge at 1C until 4.2V", "Discharge at 1C until 3V"]])
        .and_then(|e| e.repeat(cycles))
        .expect("protocol")
}

fn two_role_chain(repetitions: usize) -> CycleChain {
    CycleChain::new(
        vec![
            ChainRole::new("aging", protocol(3)),
            ChainRole::new("rpt", protocol(1)),
        ],
        repetitions,
    )
    .expect("chain")
}

fn metric(role: &str, cycles: usize, numbering: CycleNumbering) -> MetricSpec {
    MetricSpec {
        role: RoleLabel::new(role),
        series: DISCHARGE_CAPACITY.to_string(),
        step: Some(1),
        cycles_per_repetition: cycles,
        numbering,
        reduction: Reduction::Delta,
    }
}

// =============================================================================
// TIER T0: CHAIN SHAPE & LINEAGE
// =============================================================================

mod t0_chain_shape {
    use super::*;

    /// T0.1: Zero repetitions solve nothing.
    #[test]
    fn zero_repetitions_is_empty() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(0));

        assert!(outcome.store.is_empty());
        assert!(outcome.is_complete());
        assert_eq!(engine.calls.get(), 0);
    }

    /// T0.2: Every (repetition, role) pair is solved once.
    #[test]
    fn three_repetitions_of_two_roles() {
        let engine = StubEngine::new();
        let chain = two_role_chain(3);
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&chain);

        assert!(outcome.is_complete());
        assert_eq!(outcome.store.len(), 6);
        assert_eq!(engine.calls.get(), chain.solve_count());
    }

    /// T0.3: (i, B) continues from (i, A); (i, A) from (i - 1, B).
    #[test]
    fn lineage_threads_through_roles_and_repetitions() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(3));

        let aging = RoleLabel::new("aging");
        let rpt = RoleLabel::new("rpt");
        for i in 0..3 {
            let a = outcome.store.get(i, &aging).expect("aging entry");
            let b = outcome.store.get(i, &rpt).expect("rpt entry");

            assert_eq!(b.continued_from, Some(SolutionKey::new(i, "aging")));
            let expected_a = i.checked_sub(1).map(|prev| SolutionKey::new(prev, "rpt"));
            assert_eq!(a.continued_from, expected_a);
        }
    }

    /// T0.4: The starting solution handed to each solve is its predecessor.
    #[test]
    fn time_continues_across_solves() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(2));

        let entries: Vec<_> = outcome.store.iter().collect();
        for pair in entries.windows(2) {
            let (_, prev_end) = pair[0].solution.time_span().expect("span");
            let (next_start, _) = pair[1].solution.time_span().expect("span");
            assert_eq!(prev_end, next_start);
        }
    }
}

// =============================================================================
// TIER T1: CYCLE NUMBERING & METRICS
// =============================================================================

mod t1_numbering {
    use super::*;

    /// T1.1: Index is i*C + j + 1, gap-free and monotone.
    #[test]
    fn metric_role_numbering_is_gap_free() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(4));

        let series = extract_cycle_metric(&outcome.store, &metric("aging", 3, CycleNumbering::MetricRole))
            .expect("metric");
        let expected: Vec<u64> = (1..=12).collect();
        assert_eq!(series.cycles, expected);
    }

    /// T1.2: A [5, 4, 3, 2] step yields -3 for every cycle.
    #[test]
    fn delta_is_last_minus_first() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(2));

        let series = extract_cycle_metric(&outcome.store, &metric("aging", 3, CycleNumbering::MetricRole))
            .expect("metric");
        assert_eq!(series.len(), 6);
        assert!(series.values.iter().all(|v| *v == -3.0));
    }

    /// T1.3: All-roles numbering equals i*(N+2) + j + 1 for N aging cycles
    /// followed by two single-cycle roles.
    #[test]
    fn all_roles_numbering_counts_every_solved_cycle() {
        let n = 3;
        let chain = CycleChain::new(
            vec![
                ChainRole::new("aging", protocol(n)),
                ChainRole::new("charge", protocol(1)),
                ChainRole::new("rpt", protocol(1)),
            ],
            3,
        )
        .expect("chain");
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&chain);

        let series = extract_cycle_metric(&outcome.store, &metric("aging", n, CycleNumbering::AllRoles))
            .expect("metric");
        let expected: Vec<u64> = (0..3u64)
            .flat_map(|i| (0..n as u64).map(move |j| i * (n as u64 + 2) + j + 1))
            .collect();
        assert_eq!(series.cycles, expected);
    }

    /// T1.4: Whole-cycle windows span both steps.
    #[test]
    fn whole_cycle_window() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(1));

        let spec = MetricSpec {
            step: None,
            ..metric("rpt", 1, CycleNumbering::MetricRole)
        };
        let series = extract_cycle_metric(&outcome.store, &spec).expect("metric");
        assert_eq!(series.values, vec![0.0]);
    }
}

// =============================================================================
// TIER T2: FAILURE SEMANTICS
// =============================================================================

mod t2_failure {
    use super::*;

    fn chain() -> CycleChain {
        two_role_chain(5)
    }

    /// T2.1: Failure in the first role of repetition 2 keeps repetitions 0-1.
    #[test]
    fn failure_keeps_partial_results() {
        let engine = StubEngine::failing_at(4);
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&chain());

        assert!(!outcome.is_complete());
        assert_eq!(outcome.store.len(), 4);
        let stop = outcome.stop().expect("stop marker");
        assert_eq!(stop.repetition, 2);
        assert_eq!(stop.role, RoleLabel::new("aging"));
        assert!(matches!(
            stop.reason,
            StopReason::Solve(SolveError::SolverNonConvergence(_))
        ));
        assert_eq!(engine.calls.get(), 5);
    }

    /// T2.2: Roles completed within the failing repetition are kept.
    #[test]
    fn completed_roles_of_failing_repetition_survive() {
        let engine = StubEngine::failing_at(5);
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&chain());

        assert_eq!(outcome.store.len(), 5);
        assert!(outcome.store.get(2, &RoleLabel::new("aging")).is_some());
        assert!(outcome.store.get(2, &RoleLabel::new("rpt")).is_none());
        let stop = outcome.stop().expect("stop marker");
        assert_eq!((stop.repetition, stop.role.as_str()), (2, "rpt"));
    }

    /// T2.3: Partial stores still yield metrics for what was solved.
    #[test]
    fn metrics_over_partial_store() {
        let engine = StubEngine::failing_at(4);
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&chain());

        let series = extract_cycle_metric(&outcome.store, &metric("aging", 3, CycleNumbering::MetricRole))
            .expect("metric");
        assert_eq!(series.cycles, vec![1, 2, 3, 4, 5, 6]);
    }
}

// =============================================================================
// TIER T3: SHAPE ERRORS BEFORE INDEXING
// =============================================================================

mod t3_shape_errors {
    use super::*;
    use agechain_core::Location;

    /// T3.1: Fewer cycles than expected is a typed mismatch.
    #[test]
    fn short_solution_is_cycle_count_mismatch() {
        let engine = StubEngine::short(2);
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(2));

        let err = extract_cycle_metric(&outcome.store, &metric("aging", 3, CycleNumbering::MetricRole))
            .expect_err("two cycles stored, three expected");
        assert_eq!(
            err,
            ChainError::CycleCountMismatch {
                location: Location::Stored(SolutionKey::new(0, "aging")),
                expected: 3,
                actual: 2,
            }
        );
    }

    /// T3.2: Asking for a cycle beyond those produced.
    #[test]
    fn cycle_beyond_range() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(1));
        let entry = outcome.store.get(0, &RoleLabel::new("rpt")).expect("entry");

        assert!(matches!(
            entry.solution.cycle(1),
            Err(ChainError::CycleCountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    /// T3.3: Step index beyond the cycle.
    #[test]
    fn step_beyond_range() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(1));

        let spec = MetricSpec {
            step: Some(7),
            ..metric("aging", 3, CycleNumbering::MetricRole)
        };
        assert!(matches!(
            extract_cycle_metric(&outcome.store, &spec),
            Err(ChainError::StepCountMismatch { requested: 7, .. })
        ));
    }

    /// T3.4: Unknown series and unknown roles are typed.
    #[test]
    fn unknown_series_and_role() {
        let engine = StubEngine::new();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&two_role_chain(1));

        let spec = MetricSpec {
            series: "Voltage [V]".to_string(),
            ..metric("aging", 3, CycleNumbering::MetricRole)
        };
        assert!(matches!(
            extract_cycle_metric(&outcome.store, &spec),
            Err(ChainError::SeriesNotFound(_))
        ));
        assert!(matches!(
            extract_cycle_metric(&outcome.store, &metric("formation", 1, CycleNumbering::MetricRole)),
            Err(ChainError::RoleNotFound(_))
        ));
    }
}

// =============================================================================
// TIER T4: SURROGATE AGING
// =============================================================================

mod t4_surrogate {
    use super::*;
    use agechain_core::{SurrogateEngine, extract_repetition_metric};

    fn aging_chain(repetitions: usize) -> CycleChain {
        let aging = Experiment::parse(&[&[
            "Discharge at 1C until 3V",
            "Rest for 10 minutes",
            "Charge at 1C until 4.2V",
            "Hold at 4.2V until C/20",
        ]])
        .and_then(|e| e.repeat(5))
        .expect("aging");
        let rpt = Experiment::parse(&[&[
            "Discharge at C/5 until 3V",
            "Charge at 1C until 4.2V",
            "Hold at 4.2V until C/20",
        ]])
        .expect("rpt");
        CycleChain::new(
            vec![ChainRole::new("aging", aging), ChainRole::new("rpt", rpt)],
            repetitions,
        )
        .expect("chain")
    }

    /// T4.1: RPT capacity falls with every repetition.
    #[test]
    fn rpt_capacity_fades_monotonically() {
        let chain = aging_chain(4);
        let engine = SurrogateEngine::default();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&chain);
        assert!(outcome.is_complete(), "{:?}", outcome.stop());

        let capacity = extract_repetition_metric(
            &outcome.store,
            &RoleLabel::new("rpt"),
            DISCHARGE_CAPACITY,
            Some(0),
            Reduction::Delta,
        )
        .expect("rpt capacity");
        assert_eq!(capacity.cycles, vec![1, 2, 3, 4]);
        assert!(
            capacity.values.windows(2).all(|w| w[1] < w[0]),
            "capacity should fade: {:?}",
            capacity.values
        );
    }

    /// T4.2: Discharge resistance grows with every aging cycle.
    #[test]
    fn discharge_resistance_grows_per_cycle() {
        let engine = SurrogateEngine::default();
        let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&aging_chain(3));
        assert!(outcome.is_complete(), "{:?}", outcome.stop());

        let spec = MetricSpec {
            step: Some(0),
            reduction: Reduction::InternalResistance,
            ..metric("aging", 5, CycleNumbering::MetricRole)
        };
        let resistance = extract_cycle_metric(&outcome.store, &spec).expect("resistance");
        assert_eq!(resistance.len(), 15);
        assert!(resistance.values.iter().all(|r| r.is_finite() && *r > 0.0));
        assert!(
            resistance.values.windows(2).all(|w| w[1] > w[0]),
            "resistance should grow: {:?}",
            resistance.values
        );
    }
}
