//! # agechain-core
//!
//! Cycle-chain orchestration for battery aging simulations - THE LOGIC.
//!
//! This crate chains sequential solver invocations (aging cycles, top-up
//! charge, reference performance test), repeats them, threads each solve's
//! terminal state into the next, and reduces the results into per-cycle
//! metric series.
//!
//! ## Layers
//!
//! - `experiment`: textual step protocol, cycles, experiments
//! - `solution`: immutable solve results with cycle/step windows
//! - `engine`: the `SimulationEngine` seam and the built-in surrogate
//! - `store` / `chain`: append-only store and the orchestrator
//! - `metrics` / `guard` / `report` / `formats`: everything read back out
//!
//! ## Architectural Constraints
//!
//! - Synchronous: one solve at a time, no async, no network
//! - Physics stays behind `SimulationEngine`
//! - Solutions are immutable once built; the store only grows
//! - Shape problems are typed errors, never panics
//!
//! ```
//! use agechain_core::{
//!     ChainRole, ChainRunner, CycleChain, Experiment, SimulationSetup, SurrogateEngine,
//! };
//!
//! let aging = Experiment::parse(&[&["Discharge at 1C until 3V", "Charge at 1C until 4.1V"]])?
//!     .repeat(2)?;
//! let chain = CycleChain::new(vec![ChainRole::new("aging", aging)], 2)?;
//!
//! let engine = SurrogateEngine::default();
//! let outcome = ChainRunner::new(&engine, SimulationSetup::default()).run(&chain);
//! assert!(outcome.is_complete());
//! assert_eq!(outcome.store.len(), 2);
//! # Ok::<(), agechain_core::ChainError>(())
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod chain;
pub mod engine;
pub mod experiment;
pub mod formats;
pub mod guard;
pub mod metrics;
pub mod primitives;
pub mod report;
pub mod solution;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ChainError, Location, RoleLabel, SolutionKey, SolveError};

// =============================================================================
// RE-EXPORTS: Protocol & Solutions
// =============================================================================

pub use experiment::{
    CurrentSpec, CycleProtocol, Direction, Drive, Experiment, Step, Termination, parse_step,
};
pub use solution::{CycleView, Solution, SolutionBuilder, StateVector, StepRecord, StepView};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use engine::{
    ModelSpec, ParameterSpec, SimulationEngine, SimulationSetup, SolveFn, SolveRequest,
    SolverSettings, SurrogateEngine, SurrogateParams,
};

// =============================================================================
// RE-EXPORTS: Orchestration
// =============================================================================

pub use chain::{
    ChainLimits, ChainOutcome, ChainRole, ChainRunner, ChainStatus, ChainStop, CycleChain,
    StopReason,
};
pub use guard::{GuardTrip, ThermalGuard};
pub use store::{SolutionStore, StoredSolution};

// =============================================================================
// RE-EXPORTS: Results
// =============================================================================

pub use formats::{
    ChainSnapshot, MAX_SNAPSHOT_SIZE, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes,
};
pub use metrics::{
    CycleNumbering, MetricSeries, MetricSpec, Reduction, extract_cycle_metric,
    extract_repetition_metric, global_cycle_index, gradient, internal_resistance, reduce_cycle,
    window_delta, window_last, window_mean,
};
pub use report::{ChainReport, RoleSummary, SolutionSummary};
