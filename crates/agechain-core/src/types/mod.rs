//! # Core Type Definitions
//!
//! This module contains the identifiers and error types shared by every
//! part of the orchestrator:
//! - Role and store identifiers (`RoleLabel`, `SolutionKey`)
//! - Engine failures (`SolveError`)
//! - Orchestration and extraction errors (`ChainError`)
//!
//! ## Ordering Guarantees
//!
//! Identifiers implement `Ord` so that stores and reports built from them
//! iterate deterministically (`BTreeMap`/`BTreeSet`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Name of an experiment slot inside one repetition ("aging", "charge", "rpt").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleLabel(pub String);

impl RoleLabel {
    /// Create a new role label.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleLabel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Address of a stored solution: which repetition, which role.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SolutionKey {
    /// 0-based repetition index.
    pub repetition: usize,
    /// Role that produced the solution.
    pub role: RoleLabel,
}

impl SolutionKey {
    /// Create a new key.
    #[must_use]
    pub fn new(repetition: usize, role: impl Into<RoleLabel>) -> Self {
        Self {
            repetition,
            role: role.into(),
        }
    }
}

impl std::fmt::Display for SolutionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "repetition {}, role '{}'", self.repetition, self.role)
    }
}

/// Where a shape mismatch was detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// A free-standing solution, not yet stored.
    Solution,
    /// A stored solution.
    Stored(SolutionKey),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Solution => f.write_str("solution"),
            Location::Stored(key) => write!(f, "{}", key),
        }
    }
}

// =============================================================================
// ENGINE FAILURES
// =============================================================================

/// Typed failure of one solve call.
///
/// Engines must map their native failures onto these kinds so that the
/// orchestrator can record exactly why a chain stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SolveError {
    /// The engine could not satisfy the algebraic constraints of a step.
    #[error("Solver did not converge: {0}")]
    SolverNonConvergence(String),

    /// A step's stopping condition was never met within the allowed time.
    #[error("Termination condition not reached: {0}")]
    TerminationNotReached(String),

    /// The solve call exceeded its time budget.
    #[error("Solve timed out after {0} ms")]
    Timeout(u64),

    /// Any other engine-side failure (transport, malformed response).
    #[error("Engine failure: {0}")]
    Engine(String),
}

impl SolveError {
    /// Short machine-readable kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SolveError::SolverNonConvergence(_) => "solver_non_convergence",
            SolveError::TerminationNotReached(_) => "termination_not_reached",
            SolveError::Timeout(_) => "timeout",
            SolveError::Engine(_) => "engine",
        }
    }
}

// =============================================================================
// CHAIN ERRORS
// =============================================================================

/// Errors raised while building chains or reading their results.
///
/// - No silent failures
/// - Shape problems are detected before indexing, never via a panic
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    /// Fewer (or more) cycles exist than the caller expects.
    #[error("Cycle count mismatch at {location}: expected {expected} cycles, found {actual}")]
    CycleCountMismatch {
        /// Where the mismatch was found.
        location: Location,
        /// Cycles the caller expected (or the index it requested, plus one).
        expected: usize,
        /// Cycles actually present.
        actual: usize,
    },

    /// A cycle has no step at the requested index.
    #[error("Step count mismatch in cycle {cycle}: step {requested} requested, cycle has {actual}")]
    StepCountMismatch {
        /// 0-based cycle index within its solution.
        cycle: usize,
        /// 0-based step index requested.
        requested: usize,
        /// Steps actually present.
        actual: usize,
    },

    /// The solution has no series under this name.
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// The series exists but the window holds no samples.
    #[error("Series is empty: {0}")]
    EmptySeries(String),

    /// Parallel sequences of different lengths.
    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    /// A protocol step could not be parsed or validated.
    #[error("Invalid step '{input}': {reason}")]
    InvalidStep {
        /// The offending step text.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The experiment as a whole is malformed.
    #[error("Invalid experiment: {0}")]
    InvalidExperiment(String),

    /// A solution under construction has an inconsistent shape.
    #[error("Invalid solution: {0}")]
    InvalidSolution(String),

    /// The chain definition or store contents are inconsistent.
    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    /// No role with this label exists.
    #[error("Role not found: {0}")]
    RoleNotFound(RoleLabel),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl ChainError {
    /// Attach a store location to a cycle count mismatch raised by a bare solution.
    #[must_use]
    pub fn at(self, key: &SolutionKey) -> Self {
        match self {
            ChainError::CycleCountMismatch {
                location: Location::Solution,
                expected,
                actual,
            } => ChainError::CycleCountMismatch {
                location: Location::Stored(key.clone()),
                expected,
                actual,
            },
            other => other,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
