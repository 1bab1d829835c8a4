//! # Engine Module
//!
//! The seam between the orchestrator and whatever actually integrates the
//! cell model. An engine receives one [`SolveRequest`] at a time and either
//! returns a brand-new [`Solution`] or a typed [`SolveError`].
//!
//! Engines never mutate the starting solution; continuation means reading
//! its terminal state and time axis.

mod surrogate;

pub use surrogate::{SurrogateEngine, SurrogateParams};

use crate::experiment::Experiment;
use crate::solution::Solution;
use crate::types::SolveError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SIMULATION SETUP
// =============================================================================

/// Model variant and its sub-model options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model family, e.g. `DFN` or `SPM`.
    pub name: String,
    /// Sub-model switches, e.g. `SEI = "ec reaction limited"`.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            name: "DFN".to_string(),
            options: BTreeMap::new(),
        }
    }
}

/// Named parameter set plus numeric overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter set name, e.g. `Chen2020`.
    pub set: String,
    /// Values replacing entries of the named set.
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

impl Default for ParameterSpec {
    fn default() -> Self {
        Self {
            set: "Chen2020".to_string(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Solver selection and tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Solver name understood by the engine.
    pub name: String,
    /// Relative tolerance.
    #[serde(default)]
    pub rtol: Option<f64>,
    /// Absolute tolerance.
    #[serde(default)]
    pub atol: Option<f64>,
}

/// Everything about a solve that is not the experiment itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSetup {
    /// Model variant.
    #[serde(default)]
    pub model: ModelSpec,
    /// Parameter set.
    #[serde(default)]
    pub parameters: ParameterSpec,
    /// Mesh points per spatial variable (`x_n`, `r_p`, ...).
    #[serde(default)]
    pub mesh: Option<BTreeMap<String, u32>>,
    /// Solver configuration.
    #[serde(default)]
    pub solver: Option<SolverSettings>,
}

// =============================================================================
// ENGINE TRAIT
// =============================================================================

/// One solve call.
#[derive(Debug, Clone, Copy)]
pub struct SolveRequest<'a> {
    /// Model, parameters, mesh and solver.
    pub setup: &'a SimulationSetup,
    /// The protocol to run.
    pub experiment: &'a Experiment,
    /// Solution whose terminal state this solve continues from.
    pub starting_solution: Option<&'a Solution>,
}

/// A simulation engine: blocking, one experiment per call.
pub trait SimulationEngine {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Solve an experiment, optionally continuing from a prior solution.
    fn solve(&self, request: &SolveRequest<'_>) -> Result<Solution, SolveError>;
}

/// Adapter turning a closure into an engine.
///
/// ```
/// use agechain_core::{SolveFn, SimulationEngine, SolveError};
///
/// let engine = SolveFn::new("never", |_req: &agechain_core::SolveRequest<'_>| {
///     Err(SolveError::SolverNonConvergence("stub".into()))
/// });
/// assert_eq!(engine.name(), "never");
/// ```
pub struct SolveFn<F> {
    name: String,
    solve: F,
}

impl<F> SolveFn<F>
where
    F: Fn(&SolveRequest<'_>) -> Result<Solution, SolveError>,
{
    /// Wrap a closure.
    pub fn new(name: impl Into<String>, solve: F) -> Self {
        Self {
            name: name.into(),
            solve,
        }
    }
}

impl<F> SimulationEngine for SolveFn<F>
where
    F: Fn(&SolveRequest<'_>) -> Result<Solution, SolveError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn solve(&self, request: &SolveRequest<'_>) -> Result<Solution, SolveError> {
        (self.solve)(request)
    }
}
