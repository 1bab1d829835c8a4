//! # Solution Module
//!
//! The immutable result of solving one experiment.
//!
//! A [`Solution`] owns a single time axis and a table of named columns of
//! equal length. Cycles and steps are index windows into that table, so a
//! [`CycleView`] or [`StepView`] exposes the same `series(name)` accessor as
//! the solution itself, restricted to its own time window.
//!
//! Solutions are only produced through [`SolutionBuilder`], which rejects
//! ragged columns, empty steps and time going backwards.

use crate::ChainError;
use crate::primitives::TIME;
use crate::types::Location;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// STATE VECTOR
// =============================================================================

/// Named scalar state an engine leaves behind for continuation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateVector(BTreeMap<String, f64>);

impl StateVector {
    /// Create an empty state vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a named value, returning the updated vector.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Set a named value in place.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Get a named value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no entries are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// SOLUTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StepSpan {
    label: String,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CycleSpan {
    steps: Vec<StepSpan>,
}

impl CycleSpan {
    fn bounds(&self) -> (usize, usize) {
        let start = self.steps.first().map_or(0, |s| s.start);
        let end = self.steps.last().map_or(start, |s| s.end);
        (start, end)
    }
}

/// The result of one solve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    time: Vec<f64>,
    columns: BTreeMap<String, Vec<f64>>,
    cycles: Vec<CycleSpan>,
    terminal_state: StateVector,
}

impl Solution {
    /// Start building a solution.
    #[must_use]
    pub fn builder() -> SolutionBuilder {
        SolutionBuilder::new()
    }

    /// The full time axis in seconds.
    #[must_use]
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// A named series over the whole solution.
    ///
    /// `Time [s]` returns the time axis.
    pub fn series(&self, name: &str) -> Result<&[f64], ChainError> {
        self.window(name, 0, self.time.len())
    }

    fn window(&self, name: &str, start: usize, end: usize) -> Result<&[f64], ChainError> {
        let column = if name == TIME {
            &self.time
        } else {
            self.columns
                .get(name)
                .ok_or_else(|| ChainError::SeriesNotFound(name.to_string()))?
        };
        column.get(start..end).ok_or_else(|| {
            ChainError::InvalidSolution(format!(
                "window {}..{} outside series '{}' of length {}",
                start,
                end,
                name,
                column.len()
            ))
        })
    }

    /// Names of the stored columns, in order; the time axis is not listed.
    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of samples on the time axis.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.time.len()
    }

    /// Number of cycles in this solution.
    #[must_use]
    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    /// Iterate over the cycles in order.
    pub fn cycles(&self) -> impl Iterator<Item = CycleView<'_>> {
        (0..self.cycles.len()).map(move |index| CycleView {
            solution: self,
            index,
        })
    }

    /// A cycle by 0-based index.
    ///
    /// Asking past the end yields `CycleCountMismatch`, never a panic.
    pub fn cycle(&self, index: usize) -> Result<CycleView<'_>, ChainError> {
        if index < self.cycles.len() {
            Ok(CycleView {
                solution: self,
                index,
            })
        } else {
            Err(ChainError::CycleCountMismatch {
                location: Location::Solution,
                expected: index + 1,
                actual: self.cycles.len(),
            })
        }
    }

    /// The final cycle, if any.
    #[must_use]
    pub fn last_cycle(&self) -> Option<CycleView<'_>> {
        self.cycles.len().checked_sub(1).map(|index| CycleView {
            solution: self,
            index,
        })
    }

    /// State left behind for a continuing solve.
    #[must_use]
    pub fn terminal_state(&self) -> &StateVector {
        &self.terminal_state
    }

    /// First and last time stamp.
    #[must_use]
    pub fn time_span(&self) -> Option<(f64, f64)> {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        }
    }

    /// Re-check the builder's shape rules.
    ///
    /// Needed for solutions that arrive through deserialization rather than
    /// through [`SolutionBuilder`].
    pub fn validate(&self) -> Result<(), ChainError> {
        let samples = self.time.len();
        if let Some((name, values)) = self.columns.iter().find(|(_, v)| v.len() != samples) {
            return Err(ChainError::InvalidSolution(format!(
                "series '{}' has {} samples, time axis has {}",
                name,
                values.len(),
                samples
            )));
        }
        if self.time.windows(2).any(|w| w[1] < w[0]) {
            return Err(ChainError::InvalidSolution(
                "time runs backwards".to_string(),
            ));
        }
        let mut cursor = 0;
        for (index, cycle) in self.cycles.iter().enumerate() {
            if cycle.steps.is_empty() {
                return Err(ChainError::InvalidSolution(format!(
                    "cycle {} has no steps",
                    index
                )));
            }
            for step in &cycle.steps {
                if step.start != cursor || step.end <= step.start {
                    return Err(ChainError::InvalidSolution(format!(
                        "step '{}' of cycle {} spans {}..{}, expected to start at {}",
                        step.label, index, step.start, step.end, cursor
                    )));
                }
                cursor = step.end;
            }
        }
        if cursor != samples {
            return Err(ChainError::InvalidSolution(format!(
                "steps cover {} of {} samples",
                cursor, samples
            )));
        }
        Ok(())
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// A borrowed view of one cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleView<'a> {
    solution: &'a Solution,
    index: usize,
}

impl<'a> CycleView<'a> {
    fn span(&self) -> Option<&'a CycleSpan> {
        self.solution.cycles.get(self.index)
    }

    /// 0-based index of this cycle within its solution.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of steps in this cycle.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.span().map_or(0, |s| s.steps.len())
    }

    /// Iterate over the steps in order.
    pub fn steps(&self) -> impl Iterator<Item = StepView<'a>> + use<'a> {
        let solution = self.solution;
        self.span()
            .into_iter()
            .flat_map(|span| span.steps.iter())
            .map(move |span| StepView { solution, span })
    }

    /// A step by 0-based index; past the end yields `StepCountMismatch`.
    pub fn step(&self, index: usize) -> Result<StepView<'a>, ChainError> {
        self.span()
            .and_then(|span| span.steps.get(index))
            .map(|span| StepView {
                solution: self.solution,
                span,
            })
            .ok_or(ChainError::StepCountMismatch {
                cycle: self.index,
                requested: index,
                actual: self.step_count(),
            })
    }

    /// A named series restricted to this cycle.
    pub fn series(&self, name: &str) -> Result<&'a [f64], ChainError> {
        let (start, end) = self.span().map_or((0, 0), CycleSpan::bounds);
        self.solution.window(name, start, end)
    }

    /// Time axis restricted to this cycle.
    pub fn time(&self) -> Result<&'a [f64], ChainError> {
        self.series(TIME)
    }
}

/// A borrowed view of one step.
#[derive(Debug, Clone, Copy)]
pub struct StepView<'a> {
    solution: &'a Solution,
    span: &'a StepSpan,
}

impl<'a> StepView<'a> {
    /// The label the engine gave this step (usually its description).
    #[must_use]
    pub fn label(&self) -> &'a str {
        &self.span.label
    }

    /// Number of samples in this step.
    #[must_use]
    pub fn len(&self) -> usize {
        self.span.end - self.span.start
    }

    /// Always false; steps are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A named series restricted to this step.
    pub fn series(&self, name: &str) -> Result<&'a [f64], ChainError> {
        self.solution.window(name, self.span.start, self.span.end)
    }

    /// Time axis restricted to this step.
    pub fn time(&self) -> Result<&'a [f64], ChainError> {
        self.series(TIME)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Samples of one step, as produced by an engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRecord {
    /// Label for the step.
    pub label: String,
    /// Time stamps in seconds.
    pub time: Vec<f64>,
    /// Named columns, each as long as `time`.
    pub series: BTreeMap<String, Vec<f64>>,
}

impl StepRecord {
    /// Create an empty record with a label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Attach the time axis.
    #[must_use]
    pub fn with_time(mut self, time: Vec<f64>) -> Self {
        self.time = time;
        self
    }

    /// Attach a named column.
    #[must_use]
    pub fn with_series(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.series.insert(name.into(), values);
        self
    }
}

/// Validating builder for [`Solution`].
#[derive(Debug, Default)]
pub struct SolutionBuilder {
    time: Vec<f64>,
    columns: BTreeMap<String, Vec<f64>>,
    cycles: Vec<CycleSpan>,
    cycle_open: bool,
    terminal_state: StateVector,
}

impl SolutionBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new cycle; subsequent steps belong to it.
    pub fn start_cycle(&mut self) -> Result<(), ChainError> {
        if self.cycle_open && self.cycles.last().is_some_and(|c| c.steps.is_empty()) {
            return Err(ChainError::InvalidSolution(format!(
                "cycle {} has no steps",
                self.cycles.len() - 1
            )));
        }
        self.cycles.push(CycleSpan { steps: Vec::new() });
        self.cycle_open = true;
        Ok(())
    }

    /// Append a step to the current cycle, opening one if needed.
    pub fn push_step(&mut self, record: StepRecord) -> Result<(), ChainError> {
        let samples = record.time.len();
        if samples == 0 {
            return Err(ChainError::InvalidSolution(format!(
                "step '{}' has no samples",
                record.label
            )));
        }
        if record.series.contains_key(TIME) {
            return Err(ChainError::InvalidSolution(format!(
                "step '{}' redefines the time axis",
                record.label
            )));
        }
        if record.time.windows(2).any(|w| w[1] < w[0])
            || self
                .time
                .last()
                .zip(record.time.first())
                .is_some_and(|(prev, next)| next < prev)
        {
            return Err(ChainError::InvalidSolution(format!(
                "time runs backwards in step '{}'",
                record.label
            )));
        }
        if let Some((name, values)) = record.series.iter().find(|(_, v)| v.len() != samples) {
            return Err(ChainError::InvalidSolution(format!(
                "series '{}' has {} samples, step '{}' has {}",
                name,
                values.len(),
                record.label,
                samples
            )));
        }
        if !self.time.is_empty() && !record.series.keys().eq(self.columns.keys()) {
            return Err(ChainError::InvalidSolution(format!(
                "step '{}' does not carry the same series as earlier steps",
                record.label
            )));
        }

        if !self.cycle_open {
            self.start_cycle()?;
        }

        let start = self.time.len();
        self.time.extend_from_slice(&record.time);
        for (name, values) in record.series {
            self.columns.entry(name).or_default().extend(values);
        }
        let span = StepSpan {
            label: record.label,
            start,
            end: self.time.len(),
        };
        if let Some(cycle) = self.cycles.last_mut() {
            cycle.steps.push(span);
        }
        Ok(())
    }

    /// Record the state a continuing solve should start from.
    pub fn set_terminal_state(&mut self, state: StateVector) {
        self.terminal_state = state;
    }

    /// Finish the solution.
    pub fn build(self) -> Result<Solution, ChainError> {
        if let Some(index) = self.cycles.iter().position(|c| c.steps.is_empty()) {
            return Err(ChainError::InvalidSolution(format!(
                "cycle {} has no steps",
                index
            )));
        }
        Ok(Solution {
            time: self.time,
            columns: self.columns,
            cycles: self.cycles,
            terminal_state: self.terminal_state,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
