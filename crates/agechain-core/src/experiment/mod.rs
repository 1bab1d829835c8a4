//! # Experiment Module
//!
//! Declarative cycling protocols: an [`Experiment`] is an ordered list of
//! cycles, each an ordered list of [`Step`]s. Experiments are immutable once
//! built and are only ever read by engines.

mod step;

pub use step::{CurrentSpec, Direction, Drive, Step, Termination, parse_step};

use crate::ChainError;
use crate::primitives::MAX_EXPERIMENT_STEPS;
use serde::{Deserialize, Serialize};

// =============================================================================
// CYCLE PROTOCOL
// =============================================================================

/// One cycle of a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleProtocol {
    steps: Vec<Step>,
}

impl CycleProtocol {
    /// Create a cycle from already parsed steps.
    pub fn new(steps: Vec<Step>) -> Result<Self, ChainError> {
        if steps.is_empty() {
            return Err(ChainError::InvalidExperiment(
                "a cycle needs at least one step".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    /// Parse a cycle from step descriptions.
    pub fn parse<S: AsRef<str>>(steps: &[S]) -> Result<Self, ChainError> {
        let steps = steps
            .iter()
            .map(|s| Step::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(steps)
    }

    /// The steps of this cycle.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; cycles are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// =============================================================================
// EXPERIMENT
// =============================================================================

/// An ordered, non-empty sequence of cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    cycles: Vec<CycleProtocol>,
}

impl Experiment {
    /// Create an experiment from cycles.
    pub fn new(cycles: Vec<CycleProtocol>) -> Result<Self, ChainError> {
        if cycles.is_empty() {
            return Err(ChainError::InvalidExperiment(
                "an experiment needs at least one cycle".to_string(),
            ));
        }
        let steps: usize = cycles.iter().map(CycleProtocol::len).sum();
        if steps > MAX_EXPERIMENT_STEPS {
            return Err(ChainError::InvalidExperiment(format!(
                "{} steps exceed the maximum of {}",
                steps, MAX_EXPERIMENT_STEPS
            )));
        }
        Ok(Self { cycles })
    }

    /// Parse an experiment from a list of cycles given as step descriptions.
    ///
    /// ```
    /// use agechain_core::Experiment;
    ///
    /// let exp = Experiment::parse(&[&["Charge at 1C until 4.2V", "Rest for 1 hour"]])?;
    /// assert_eq!(exp.cycle_count(), 1);
    /// # Ok::<(), agechain_core::ChainError>(())
    /// ```
    pub fn parse<C, S>(cycles: &[C]) -> Result<Self, ChainError>
    where
        C: AsRef<[S]>,
        S: AsRef<str>,
    {
        let cycles = cycles
            .iter()
            .map(|c| CycleProtocol::parse(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(cycles)
    }

    /// Repeat this experiment's cycle list `times` times.
    pub fn repeat(self, times: usize) -> Result<Self, ChainError> {
        if times == 0 {
            return Err(ChainError::InvalidExperiment(
                "repeat count must be at least 1".to_string(),
            ));
        }
        let total = self.step_count().saturating_mul(times);
        if total > MAX_EXPERIMENT_STEPS {
            return Err(ChainError::InvalidExperiment(format!(
                "{} steps exceed the maximum of {}",
                total, MAX_EXPERIMENT_STEPS
            )));
        }
        let cycles = std::iter::repeat_n(self.cycles, times).flatten().collect();
        Self::new(cycles)
    }

    /// Append another experiment's cycles after this one's.
    pub fn then(self, other: Experiment) -> Result<Self, ChainError> {
        let mut cycles = self.cycles;
        cycles.extend(other.cycles);
        Self::new(cycles)
    }

    /// The cycles of this experiment.
    #[must_use]
    pub fn cycles(&self) -> &[CycleProtocol] {
        &self.cycles
    }

    /// Number of cycles a complete solve produces.
    #[must_use]
    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    /// Total number of steps across all cycles.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.cycles.iter().map(CycleProtocol::len).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================
