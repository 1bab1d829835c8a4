//! # Cycle-Chain Orchestrator
//!
//! Runs `M` repetitions of an ordered list of roles, threading each solve's
//! terminal state into the next:
//!
//! - The first role of repetition 0 starts fresh.
//! - Every later solve continues from the most recently stored solution,
//!   which is the preceding role of the same repetition or the last role of
//!   the previous repetition.
//!
//! A solve failure stops the chain. Everything solved so far is kept and
//! the outcome names the repetition and role that stopped it.

use crate::ChainError;
use crate::engine::{SimulationEngine, SimulationSetup, SolveRequest};
use crate::experiment::Experiment;
use crate::guard::{GuardTrip, ThermalGuard};
use crate::primitives::{MAX_REPETITIONS, MAX_ROLES};
use crate::store::{SolutionStore, StoredSolution};
use crate::types::{RoleLabel, SolutionKey, SolveError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use thiserror::Error;

// =============================================================================
// CHAIN DEFINITION
// =============================================================================

/// A named experiment slot inside each repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRole {
    /// Role label, unique within the chain.
    pub label: RoleLabel,
    /// Experiment solved for this role in every repetition.
    pub experiment: Experiment,
}

impl ChainRole {
    /// Create a role.
    #[must_use]
    pub fn new(label: impl Into<RoleLabel>, experiment: Experiment) -> Self {
        Self {
            label: label.into(),
            experiment,
        }
    }

    /// Cycles a complete solve of this role produces.
    #[must_use]
    pub fn expected_cycles(&self) -> usize {
        self.experiment.cycle_count()
    }
}

/// Ordered roles repeated a fixed number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleChain {
    roles: Vec<ChainRole>,
    repetitions: usize,
}

impl CycleChain {
    /// Validate and create a chain.
    pub fn new(roles: Vec<ChainRole>, repetitions: usize) -> Result<Self, ChainError> {
        if roles.is_empty() {
            return Err(ChainError::InvalidChain(
                "a chain needs at least one role".to_string(),
            ));
        }
        if roles.len() > MAX_ROLES {
            return Err(ChainError::InvalidChain(format!(
                "{} roles exceed the maximum of {}",
                roles.len(),
                MAX_ROLES
            )));
        }
        if repetitions > MAX_REPETITIONS {
            return Err(ChainError::InvalidChain(format!(
                "{} repetitions exceed the maximum of {}",
                repetitions, MAX_REPETITIONS
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = roles.iter().find(|r| !seen.insert(&r.label)) {
            return Err(ChainError::InvalidChain(format!(
                "role '{}' appears twice",
                dup.label
            )));
        }
        Ok(Self { roles, repetitions })
    }

    /// Roles in solve order.
    #[must_use]
    pub fn roles(&self) -> &[ChainRole] {
        &self.roles
    }

    /// A role by label.
    pub fn role(&self, label: &RoleLabel) -> Result<&ChainRole, ChainError> {
        self.roles
            .iter()
            .find(|r| &r.label == label)
            .ok_or_else(|| ChainError::RoleNotFound(label.clone()))
    }

    /// Number of repetitions.
    #[must_use]
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Solve calls a complete run makes.
    #[must_use]
    pub fn solve_count(&self) -> usize {
        self.roles.len() * self.repetitions
    }
}

// =============================================================================
// LIMITS & OUTCOME
// =============================================================================

/// Optional bounds on a chain run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainLimits {
    /// Budget checked before every solve.
    pub wall_clock: Option<Duration>,
    /// Inspection applied after every solve.
    pub thermal: Option<ThermalGuard>,
}

/// Why a chain stopped early.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum StopReason {
    /// The engine failed.
    #[error(transparent)]
    Solve(#[from] SolveError),

    /// The wall-clock budget ran out before the next solve.
    #[error("wall-clock budget of {limit_ms} ms exhausted")]
    WallClockExceeded {
        /// Configured budget.
        limit_ms: u64,
    },

    /// The solution was stored but exceeded a thermal limit.
    #[error("thermal guard tripped: {0}")]
    GuardTripped(GuardTrip),

    /// The solution could not be added to the store.
    #[error("solution could not be stored: {0}")]
    Store(String),
}

/// Marker naming where and why a chain stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStop {
    /// Repetition being solved.
    pub repetition: usize,
    /// Role being solved.
    pub role: RoleLabel,
    /// What happened.
    pub reason: StopReason,
}

impl std::fmt::Display for ChainStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stopped at repetition {}, role '{}': {}",
            self.repetition, self.role, self.reason
        )
    }
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Every repetition of every role was solved.
    Completed,
    /// The run stopped early.
    Stopped(ChainStop),
}

/// Store plus status of one run.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Every solution obtained, in solve order.
    pub store: SolutionStore,
    /// Completion or stop marker.
    pub status: ChainStatus,
}

impl ChainOutcome {
    /// True when the whole chain ran.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.status, ChainStatus::Completed)
    }

    /// The stop marker, if the chain stopped early.
    #[must_use]
    pub fn stop(&self) -> Option<&ChainStop> {
        match &self.status {
            ChainStatus::Completed => None,
            ChainStatus::Stopped(stop) => Some(stop),
        }
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Drives a [`CycleChain`] against an engine.
pub struct ChainRunner<'e, E: SimulationEngine + ?Sized> {
    engine: &'e E,
    setup: SimulationSetup,
    limits: ChainLimits,
}

impl<'e, E: SimulationEngine + ?Sized> ChainRunner<'e, E> {
    /// Create a runner with no limits.
    pub fn new(engine: &'e E, setup: SimulationSetup) -> Self {
        Self {
            engine,
            setup,
            limits: ChainLimits::default(),
        }
    }

    /// Apply limits to every run.
    #[must_use]
    pub fn with_limits(mut self, limits: ChainLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Run the chain to completion or to its first stop.
    pub fn run(&self, chain: &CycleChain) -> ChainOutcome {
        let span = tracing::info_span!(
            "chain",
            engine = self.engine.name(),
            repetitions = chain.repetitions(),
            roles = chain.roles().len()
        );
        let _enter = span.enter();

        let started = Instant::now();
        let mut store = SolutionStore::new();

        let result = (0..chain.repetitions()).try_for_each(|repetition| {
            chain
                .roles()
                .iter()
                .try_for_each(|role| self.solve_role(repetition, role, &mut store, started))
        });

        let status = match result {
            Ok(()) => {
                tracing::info!(solutions = store.len(), "chain completed");
                ChainStatus::Completed
            }
            Err(stop) => {
                tracing::warn!(
                    repetition = stop.repetition,
                    role = %stop.role,
                    solutions = store.len(),
                    reason = %stop.reason,
                    "chain stopped"
                );
                ChainStatus::Stopped(stop)
            }
        };
        ChainOutcome { store, status }
    }

    fn solve_role(
        &self,
        repetition: usize,
        role: &ChainRole,
        store: &mut SolutionStore,
        started: Instant,
    ) -> Result<(), ChainStop> {
        let stop = |reason: StopReason| ChainStop {
            repetition,
            role: role.label.clone(),
            reason,
        };

        if let Some(limit) = self.limits.wall_clock
            && started.elapsed() >= limit
        {
            return Err(stop(StopReason::WallClockExceeded {
                limit_ms: limit.as_millis() as u64,
            }));
        }

        let prior = store.last();
        let continued_from = prior.map(|e| e.key.clone());
        let request = SolveRequest {
            setup: &self.setup,
            experiment: &role.experiment,
            starting_solution: prior.map(|e| &e.solution),
        };

        let solve_started = Instant::now();
        let solution = self.engine.solve(&request).map_err(|e| {
            tracing::debug!(repetition, role = %role.label, kind = e.kind(), "solve failed");
            stop(StopReason::Solve(e))
        })?;

        tracing::info!(
            repetition,
            role = %role.label,
            cycles = solution.cycle_count(),
            elapsed_ms = solve_started.elapsed().as_millis() as u64,
            "solved"
        );
        if solution.cycle_count() != role.expected_cycles() {
            tracing::warn!(
                repetition,
                role = %role.label,
                expected = role.expected_cycles(),
                actual = solution.cycle_count(),
                "engine returned an unexpected number of cycles"
            );
        }

        let trip = self
            .limits
            .thermal
            .as_ref()
            .and_then(|guard| guard.inspect(&solution));

        store
            .push(StoredSolution {
                key: SolutionKey::new(repetition, role.label.clone()),
                continued_from,
                solution,
            })
            .map_err(|e| stop(StopReason::Store(e.to_string())))?;

        match trip {
            Some(trip) => Err(stop(StopReason::GuardTripped(trip))),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
