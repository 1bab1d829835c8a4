//! # Metric Extraction
//!
//! Turns stored solutions into flat `(cycle, value)` series for plotting.
//!
//! Shape checks come first: every stored solution of the metric role is
//! checked against the expected cycle count before any cycle is indexed,
//! so a short solve surfaces as `CycleCountMismatch` rather than a panic or
//! a silently truncated series.

use crate::ChainError;
use crate::primitives::{CURRENT, OPEN_CIRCUIT_VOLTAGE, REST_CURRENT_THRESHOLD, VOLTAGE};
use crate::solution::CycleView;
use crate::store::SolutionStore;
use crate::types::{Location, RoleLabel, SolutionKey};
use serde::{Deserialize, Serialize};

// =============================================================================
// SERIES PRIMITIVES
// =============================================================================

/// Last minus first sample.
pub fn window_delta(series: &[f64]) -> Result<f64, ChainError> {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) => Ok(last - first),
        _ => Err(ChainError::EmptySeries("window has no samples".to_string())),
    }
}

/// Final sample.
pub fn window_last(series: &[f64]) -> Result<f64, ChainError> {
    series
        .last()
        .copied()
        .ok_or_else(|| ChainError::EmptySeries("window has no samples".to_string()))
}

/// Arithmetic mean of the samples.
pub fn window_mean(series: &[f64]) -> Result<f64, ChainError> {
    if series.is_empty() {
        return Err(ChainError::EmptySeries("window has no samples".to_string()));
    }
    Ok(series.iter().sum::<f64>() / series.len() as f64)
}

/// Time derivative of `values`: central differences inside, one-sided at
/// the ends. Zero where two samples share a time stamp.
pub fn gradient(values: &[f64], time: &[f64]) -> Result<Vec<f64>, ChainError> {
    if values.len() != time.len() {
        return Err(ChainError::LengthMismatch(format!(
            "{} values against {} time stamps",
            values.len(),
            time.len()
        )));
    }
    let n = values.len();
    if n < 2 {
        return Ok(vec![0.0; n]);
    }
    let slope = |a: usize, b: usize| {
        let dt = time[b] - time[a];
        if dt > 0.0 {
            (values[b] - values[a]) / dt
        } else {
            0.0
        }
    };
    Ok((0..n)
        .map(|i| match i {
            0 => slope(0, 1),
            i if i == n - 1 => slope(n - 2, n - 1),
            i => slope(i - 1, i + 1),
        })
        .collect())
}

/// `(OCV - V) / I` per sample; `NaN` while the cell is at rest.
pub fn internal_resistance(
    ocv: &[f64],
    voltage: &[f64],
    current: &[f64],
) -> Result<Vec<f64>, ChainError> {
    if ocv.len() != voltage.len() || ocv.len() != current.len() {
        return Err(ChainError::LengthMismatch(format!(
            "ocv {}, voltage {}, current {}",
            ocv.len(),
            voltage.len(),
            current.len()
        )));
    }
    Ok(ocv
        .iter()
        .zip(voltage)
        .zip(current)
        .map(|((u, v), i)| {
            if i.abs() < REST_CURRENT_THRESHOLD {
                f64::NAN
            } else {
                (u - v) / i
            }
        })
        .collect())
}

// =============================================================================
// METRIC SERIES
// =============================================================================

/// How global cycle indices are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleNumbering {
    /// Count only the metric role's cycles: `i * C + j + 1`.
    #[default]
    MetricRole,
    /// Count every cycle solved by any role, in chain order.
    AllRoles,
}

impl std::str::FromStr for CycleNumbering {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metric-role" => Ok(CycleNumbering::MetricRole),
            "all-roles" => Ok(CycleNumbering::AllRoles),
            other => Err(ChainError::InvalidChain(format!(
                "unknown cycle numbering '{}', expected metric-role or all-roles",
                other
            ))),
        }
    }
}

/// How one cycle window collapses to a single value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reduction {
    /// Last minus first sample of the series.
    #[default]
    Delta,
    /// Final sample of the series.
    Last,
    /// Mean of the series.
    Mean,
    /// Mean of `(OCV - V) / I` over the loaded samples. Ignores the
    /// configured series name.
    InternalResistance,
}

impl std::str::FromStr for Reduction {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delta" => Ok(Reduction::Delta),
            "last" => Ok(Reduction::Last),
            "mean" => Ok(Reduction::Mean),
            "internal-resistance" => Ok(Reduction::InternalResistance),
            other => Err(ChainError::InvalidChain(format!(
                "unknown reduction '{}', expected delta, last, mean or internal-resistance",
                other
            ))),
        }
    }
}

fn cycle_window<'a>(
    cycle: &CycleView<'a>,
    step: Option<usize>,
    name: &str,
) -> Result<&'a [f64], ChainError> {
    match step {
        Some(step) => cycle.step(step)?.series(name),
        None => cycle.series(name),
    }
}

/// Reduce one cycle, or one step of it, to a value.
pub fn reduce_cycle(
    cycle: &CycleView<'_>,
    step: Option<usize>,
    series: &str,
    reduction: Reduction,
) -> Result<f64, ChainError> {
    match reduction {
        Reduction::Delta => window_delta(cycle_window(cycle, step, series)?),
        Reduction::Last => window_last(cycle_window(cycle, step, series)?),
        Reduction::Mean => window_mean(cycle_window(cycle, step, series)?),
        Reduction::InternalResistance => {
            let resistance = internal_resistance(
                cycle_window(cycle, step, OPEN_CIRCUIT_VOLTAGE)?,
                cycle_window(cycle, step, VOLTAGE)?,
                cycle_window(cycle, step, CURRENT)?,
            )?;
            let loaded: Vec<f64> = resistance.into_iter().filter(|r| r.is_finite()).collect();
            window_mean(&loaded)
        }
    }
}

/// Which series to reduce, over which cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Role whose solutions are reduced.
    pub role: RoleLabel,
    /// Series name, e.g. `Discharge capacity [A.h]`.
    pub series: String,
    /// Step within each cycle; `None` takes the whole cycle.
    #[serde(default)]
    pub step: Option<usize>,
    /// Cycles each solution of the role must contain.
    pub cycles_per_repetition: usize,
    /// Index assignment.
    #[serde(default)]
    pub numbering: CycleNumbering,
    /// Per-cycle reduction.
    #[serde(default)]
    pub reduction: Reduction,
}

/// Parallel sequences of global cycle index and value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    /// 1-based, strictly increasing indices.
    pub cycles: Vec<u64>,
    /// One value per index.
    pub values: Vec<f64>,
}

impl MetricSeries {
    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    /// True when there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Iterate `(cycle, value)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.cycles.iter().copied().zip(self.values.iter().copied())
    }

    fn push(&mut self, cycle: u64, value: f64) {
        self.cycles.push(cycle);
        self.values.push(value);
    }
}

/// 1-based global index of cycle `j` of repetition `i` with `C` cycles each.
#[must_use]
pub fn global_cycle_index(repetition: usize, cycles_per_repetition: usize, cycle: usize) -> u64 {
    (repetition as u64) * (cycles_per_repetition as u64) + (cycle as u64) + 1
}

/// Reduce one series per cycle of a role into a metric series.
pub fn extract_cycle_metric(
    store: &SolutionStore,
    spec: &MetricSpec,
) -> Result<MetricSeries, ChainError> {
    let mut entries = store.for_role(&spec.role).peekable();
    if entries.peek().is_none() {
        return Err(ChainError::RoleNotFound(spec.role.clone()));
    }

    for entry in store.for_role(&spec.role) {
        let actual = entry.solution.cycle_count();
        if actual != spec.cycles_per_repetition {
            return Err(ChainError::CycleCountMismatch {
                location: Location::Stored(entry.key.clone()),
                expected: spec.cycles_per_repetition,
                actual,
            });
        }
    }

    let offsets = match spec.numbering {
        CycleNumbering::MetricRole => None,
        CycleNumbering::AllRoles => Some(cycle_offsets(store)),
    };

    let mut series = MetricSeries::default();
    for entry in entries {
        let key = &entry.key;
        for cycle in entry.solution.cycles() {
            let value = reduce_cycle(&cycle, spec.step, &spec.series, spec.reduction).map_err(
                |e| match e {
                    ChainError::EmptySeries(_) => ChainError::EmptySeries(format!(
                        "'{}' in cycle {} of {}",
                        spec.series,
                        cycle.index(),
                        key
                    )),
                    other => other.at(key),
                },
            )?;

            let index = match &offsets {
                None => {
                    global_cycle_index(key.repetition, spec.cycles_per_repetition, cycle.index())
                }
                Some(offsets) => {
                    let solved_before = offsets
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map_or(0, |(_, offset)| *offset);
                    solved_before + cycle.index() as u64 + 1
                }
            };
            series.push(index, value);
        }
    }

    tracing::debug!(
        role = %spec.role,
        series = %spec.series,
        points = series.len(),
        "extracted cycle metric"
    );
    Ok(series)
}

/// Number of cycles solved before each stored entry, in chain order.
fn cycle_offsets(store: &SolutionStore) -> Vec<(&SolutionKey, u64)> {
    store
        .iter()
        .scan(0u64, |solved, entry| {
            let before = *solved;
            *solved += entry.solution.cycle_count() as u64;
            Some((&entry.key, before))
        })
        .collect()
}

/// Reduce the last cycle of each solution of a role, indexed by 1-based
/// repetition number.
pub fn extract_repetition_metric(
    store: &SolutionStore,
    role: &RoleLabel,
    series_name: &str,
    step: Option<usize>,
    reduction: Reduction,
) -> Result<MetricSeries, ChainError> {
    let mut series = MetricSeries::default();
    for entry in store.for_role(role) {
        let cycle = entry.solution.last_cycle().ok_or_else(|| {
            ChainError::CycleCountMismatch {
                location: Location::Stored(entry.key.clone()),
                expected: 1,
                actual: 0,
            }
        })?;
        let value = reduce_cycle(&cycle, step, series_name, reduction)?;
        series.push(entry.key.repetition as u64 + 1, value);
    }
    if series.is_empty() {
        return Err(ChainError::RoleNotFound(role.clone()));
    }
    Ok(series)
}

// =============================================================================
// TESTS
// =============================================================================
