//! # Chain Report
//!
//! Serializable summary of a run: status and stop marker, one line per
//! stored solution, and any metric series extracted from it. The app layer
//! writes it as JSON next to the metric CSV.

use crate::chain::{ChainStatus, CycleChain};
use crate::metrics::MetricSeries;
use crate::solution::StateVector;
use crate::store::SolutionStore;
use crate::types::{RoleLabel, SolutionKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A role and the cycle count a complete solve of it yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    /// Role label.
    pub label: RoleLabel,
    /// Cycles in the role's experiment.
    pub expected_cycles: usize,
}

impl RoleSummary {
    /// Summaries of every role of a chain, in solve order.
    #[must_use]
    pub fn of_chain(chain: &CycleChain) -> Vec<Self> {
        chain
            .roles()
            .iter()
            .map(|r| Self {
                label: r.label.clone(),
                expected_cycles: r.expected_cycles(),
            })
            .collect()
    }
}

/// One stored solution, without its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionSummary {
    /// Address in the store.
    pub key: SolutionKey,
    /// Entry this solve continued from.
    pub continued_from: Option<SolutionKey>,
    /// Cycles produced.
    pub cycles: usize,
    /// Samples on the time axis.
    pub samples: usize,
    /// First time stamp.
    pub start_time_s: Option<f64>,
    /// Last time stamp.
    pub end_time_s: Option<f64>,
    /// State handed to the next solve.
    pub terminal_state: StateVector,
}

/// Summary of a chain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    /// Chain name.
    pub name: String,
    /// Engine that solved it.
    pub engine: String,
    /// Repetitions requested.
    pub repetitions: usize,
    /// Roles in solve order.
    pub roles: Vec<RoleSummary>,
    /// Completion or stop marker.
    pub status: ChainStatus,
    /// One entry per stored solution, in solve order.
    pub solutions: Vec<SolutionSummary>,
    /// Named metric series.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSeries>,
}

impl ChainReport {
    /// Summarize a store.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        engine: impl Into<String>,
        repetitions: usize,
        roles: Vec<RoleSummary>,
        store: &SolutionStore,
        status: ChainStatus,
    ) -> Self {
        let solutions = store
            .iter()
            .map(|entry| {
                let span = entry.solution.time_span();
                SolutionSummary {
                    key: entry.key.clone(),
                    continued_from: entry.continued_from.clone(),
                    cycles: entry.solution.cycle_count(),
                    samples: entry.solution.sample_count(),
                    start_time_s: span.map(|(start, _)| start),
                    end_time_s: span.map(|(_, end)| end),
                    terminal_state: entry.solution.terminal_state().clone(),
                }
            })
            .collect();
        Self {
            name: name.into(),
            engine: engine.into(),
            repetitions,
            roles,
            status,
            solutions,
            metrics: BTreeMap::new(),
        }
    }

    /// Attach a metric series under a name.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, series: MetricSeries) -> Self {
        self.metrics.insert(name.into(), series);
        self
    }

    /// True when the chain ran to completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.status, ChainStatus::Completed)
    }
}
