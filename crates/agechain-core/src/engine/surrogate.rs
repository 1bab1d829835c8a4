//! # Surrogate Engine
//!
//! A deterministic equivalent-circuit stand-in for a full cell model, so
//! chains can run with no external framework attached.
//!
//! - Terminal voltage: `V = OCV(soc) - I·R`, current positive on discharge.
//! - Capacity fade in equivalent full cycles `n`:
//!   `Q(n) = Q0 - k_lli·√n - k_linear·n`, floored at 10 % of `Q0`.
//! - Resistance growth: `R(n) = R0 + k_r_linear·n + k_r_sqrt·√n`.
//! - Lumped thermal balance: `C·dT/dt = I²R - h·(T - T_amb)`.
//!
//! Default fade constants remove roughly 1 Ah from a 5 Ah cell over 1200
//! equivalent cycles.

use super::{ParameterSpec, SimulationEngine, SolveRequest};
use crate::ChainError;
use crate::experiment::{Direction, Drive, Step, Termination};
use crate::primitives::{
    CAPACITY, CELL_TEMPERATURE, CURRENT, DISCHARGE_CAPACITY, OPEN_CIRCUIT_VOLTAGE,
    REST_CURRENT_THRESHOLD, RESISTANCE, STATE_DISCHARGE_CAPACITY, STATE_OF_CHARGE, STATE_SOC,
    STATE_TEMPERATURE, STATE_THROUGHPUT, STATE_TIME, THROUGHPUT_CAPACITY, VOLTAGE,
};
use crate::solution::{Solution, StateVector, StepRecord};
use crate::types::SolveError;
use serde::{Deserialize, Serialize};

/// Tolerance for comparing accumulated step time against its limit.
const TIME_EPSILON: f64 = 1e-9;

// =============================================================================
// PARAMETERS
// =============================================================================

/// Tunables of the surrogate cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurrogateParams {
    /// Nominal (fresh) capacity; C-rates resolve against it.
    pub nominal_capacity_ah: f64,
    /// Linear OCV anchor at empty.
    pub ocv_empty_v: f64,
    /// OCV at full charge.
    pub ocv_full_v: f64,
    /// Depth of the low-SOC voltage knee.
    pub knee_v: f64,
    /// Width of the low-SOC voltage knee, as a SOC fraction.
    pub knee_width: f64,
    /// Fresh ohmic resistance.
    pub resistance_ohm: f64,
    /// Square-root fade coefficient (lithium inventory loss), Ah per √cycle.
    pub k_lli: f64,
    /// Linear fade coefficient (plating, cracking, active material loss), Ah per cycle.
    pub k_linear: f64,
    /// Linear resistance growth, Ohm per cycle.
    pub k_r_linear: f64,
    /// Square-root resistance growth, Ohm per √cycle.
    pub k_r_sqrt: f64,
    /// Ambient temperature unless a step overrides it.
    pub ambient_temperature_k: f64,
    /// Lumped heat capacity.
    pub heat_capacity_j_per_k: f64,
    /// Heat transfer to ambient.
    pub heat_transfer_w_per_k: f64,
    /// SOC of a fresh cell.
    pub initial_soc: f64,
    /// Sampling period when a step names none.
    pub default_period_s: f64,
    /// Integration sub-steps per sampling period.
    pub substeps: u32,
    /// Upper bound on one integration sub-step.
    pub max_substep_s: f64,
    /// Longest a step may run while waiting for its condition.
    pub max_step_duration_s: f64,
    /// Currents above this C-rate are treated as non-convergent.
    pub max_c_rate: f64,
}

impl Default for SurrogateParams {
    fn default() -> Self {
        Self {
            nominal_capacity_ah: 5.0,
            ocv_empty_v: 3.0,
            ocv_full_v: 4.2,
            knee_v: 1.0,
            knee_width: 0.03,
            resistance_ohm: 0.03,
            k_lli: 0.3 / 1200f64.sqrt(),
            k_linear: 0.75 / 1200.0,
            k_r_linear: 2e-5,
            k_r_sqrt: 1e-4,
            ambient_temperature_k: 298.15,
            heat_capacity_j_per_k: 70.0,
            heat_transfer_w_per_k: 0.2,
            initial_soc: 1.0,
            default_period_s: 60.0,
            substeps: 10,
            max_substep_s: 5.0,
            max_step_duration_s: 86_400.0,
            max_c_rate: 15.0,
        }
    }
}

impl SurrogateParams {
    /// Check that every parameter is physically meaningful.
    pub fn validate(&self) -> Result<(), ChainError> {
        let positive = [
            ("nominal_capacity_ah", self.nominal_capacity_ah),
            ("knee_width", self.knee_width),
            ("resistance_ohm", self.resistance_ohm),
            ("ambient_temperature_k", self.ambient_temperature_k),
            ("heat_capacity_j_per_k", self.heat_capacity_j_per_k),
            ("default_period_s", self.default_period_s),
            ("max_substep_s", self.max_substep_s),
            ("max_step_duration_s", self.max_step_duration_s),
            ("max_c_rate", self.max_c_rate),
        ];
        if let Some((name, value)) = positive
            .iter()
            .find(|(_, v)| !(v.is_finite() && *v > 0.0))
        {
            return Err(ChainError::InvalidChain(format!(
                "surrogate parameter {} must be positive, got {}",
                name, value
            )));
        }
        if self.ocv_full_v <= self.ocv_empty_v {
            return Err(ChainError::InvalidChain(
                "surrogate ocv_full_v must exceed ocv_empty_v".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.initial_soc) {
            return Err(ChainError::InvalidChain(
                "surrogate initial_soc must lie in [0, 1]".to_string(),
            ));
        }
        if self.substeps == 0 {
            return Err(ChainError::InvalidChain(
                "surrogate substeps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the overrides of a parameter set that this engine understands.
    #[must_use]
    pub fn with_overrides(&self, parameters: &ParameterSpec) -> Self {
        let mut params = self.clone();
        for (name, value) in &parameters.overrides {
            match name.as_str() {
                "Nominal cell capacity [A.h]" => params.nominal_capacity_ah = *value,
                "Ambient temperature [K]" => params.ambient_temperature_k = *value,
                "Initial temperature [K]" => params.ambient_temperature_k = *value,
                "Cell resistance [Ohm]" => params.resistance_ohm = *value,
                _ => tracing::debug!(parameter = %name, "surrogate engine ignores parameter"),
            }
        }
        params
    }

    fn equivalent_cycles(&self, throughput_ah: f64) -> f64 {
        throughput_ah / (2.0 * self.nominal_capacity_ah)
    }

    /// Remaining capacity after the given charge throughput.
    #[must_use]
    pub fn capacity_ah(&self, throughput_ah: f64) -> f64 {
        let n = self.equivalent_cycles(throughput_ah);
        let faded = self.nominal_capacity_ah - self.k_lli * n.sqrt() - self.k_linear * n;
        faded.max(0.1 * self.nominal_capacity_ah)
    }

    /// Ohmic resistance after the given charge throughput.
    #[must_use]
    pub fn resistance_at(&self, throughput_ah: f64) -> f64 {
        let n = self.equivalent_cycles(throughput_ah);
        self.resistance_ohm + self.k_r_linear * n + self.k_r_sqrt * n.sqrt()
    }

    /// Open-circuit voltage at a state of charge.
    #[must_use]
    pub fn ocv(&self, soc: f64) -> f64 {
        self.ocv_empty_v + (self.ocv_full_v - self.ocv_empty_v) * soc
            - self.knee_v * (-soc / self.knee_width).exp()
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Empirical, deterministic engine.
#[derive(Debug, Clone)]
pub struct SurrogateEngine {
    params: SurrogateParams,
}

impl SurrogateEngine {
    /// Create an engine after validating its parameters.
    pub fn new(params: SurrogateParams) -> Result<Self, ChainError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The engine's base parameters.
    #[must_use]
    pub fn params(&self) -> &SurrogateParams {
        &self.params
    }
}

impl Default for SurrogateEngine {
    fn default() -> Self {
        Self {
            params: SurrogateParams::default(),
        }
    }
}

impl SimulationEngine for SurrogateEngine {
    fn name(&self) -> &str {
        "surrogate"
    }

    fn solve(&self, request: &SolveRequest<'_>) -> Result<Solution, SolveError> {
        let params = self.params.with_overrides(&request.setup.parameters);
        params
            .validate()
            .map_err(|e| SolveError::Engine(e.to_string()))?;

        let mut cell = CellState::resume(&params, request.starting_solution);
        let mut builder = Solution::builder();

        for (cycle_index, cycle) in request.experiment.cycles().iter().enumerate() {
            builder.start_cycle().map_err(internal)?;
            for step in cycle.steps() {
                let record = simulate_step(&params, &mut cell, step)
                    .map_err(|e| with_context(e, cycle_index, step))?;
                builder.push_step(record).map_err(internal)?;
            }
        }

        tracing::debug!(
            cycles = request.experiment.cycle_count(),
            soc = cell.soc,
            throughput_ah = cell.throughput_ah,
            "surrogate solve finished"
        );

        builder.set_terminal_state(cell.to_state());
        builder.build().map_err(internal)
    }
}

fn internal(e: ChainError) -> SolveError {
    SolveError::Engine(e.to_string())
}

fn with_context(e: SolveError, cycle: usize, step: &Step) -> SolveError {
    let context = |msg: String| format!("cycle {}, step '{}': {}", cycle, step, msg);
    match e {
        SolveError::SolverNonConvergence(m) => SolveError::SolverNonConvergence(context(m)),
        SolveError::TerminationNotReached(m) => SolveError::TerminationNotReached(context(m)),
        SolveError::Engine(m) => SolveError::Engine(context(m)),
        other => other,
    }
}

// =============================================================================
// CELL STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct CellState {
    time_s: f64,
    soc: f64,
    temperature_k: f64,
    throughput_ah: f64,
    discharge_ah: f64,
}

impl CellState {
    fn fresh(params: &SurrogateParams) -> Self {
        Self {
            time_s: 0.0,
            soc: params.initial_soc,
            temperature_k: params.ambient_temperature_k,
            throughput_ah: 0.0,
            discharge_ah: 0.0,
        }
    }

    fn resume(params: &SurrogateParams, prior: Option<&Solution>) -> Self {
        let fresh = Self::fresh(params);
        let Some(solution) = prior else {
            return fresh;
        };
        let state = solution.terminal_state();
        let end_time = solution.time_span().map_or(fresh.time_s, |(_, end)| end);
        Self {
            time_s: state.get(STATE_TIME).unwrap_or(end_time),
            soc: state.get(STATE_SOC).unwrap_or(fresh.soc).clamp(0.0, 1.0),
            temperature_k: state.get(STATE_TEMPERATURE).unwrap_or(fresh.temperature_k),
            throughput_ah: state.get(STATE_THROUGHPUT).unwrap_or(fresh.throughput_ah),
            discharge_ah: state
                .get(STATE_DISCHARGE_CAPACITY)
                .unwrap_or(fresh.discharge_ah),
        }
    }

    fn to_state(self) -> StateVector {
        StateVector::new()
            .with(STATE_TIME, self.time_s)
            .with(STATE_SOC, self.soc)
            .with(STATE_TEMPERATURE, self.temperature_k)
            .with(STATE_THROUGHPUT, self.throughput_ah)
            .with(STATE_DISCHARGE_CAPACITY, self.discharge_ah)
    }

    fn advance(&mut self, params: &SurrogateParams, op: &Operating, h: f64, ambient_k: f64) {
        let capacity = params.capacity_ah(self.throughput_ah);
        let charge_ah = op.current * h / 3600.0;
        self.soc = (self.soc - charge_ah / capacity).clamp(0.0, 1.0);
        self.discharge_ah += charge_ah;
        self.throughput_ah += charge_ah.abs();

        let heat_w = op.current * op.current * op.resistance;
        let loss_w = params.heat_transfer_w_per_k * (self.temperature_k - ambient_k);
        self.temperature_k += h * (heat_w - loss_w) / params.heat_capacity_j_per_k;
        self.time_s += h;
    }
}

// =============================================================================
// STEP INTEGRATION
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Operating {
    current: f64,
    voltage: f64,
    ocv: f64,
    resistance: f64,
}

fn signed(direction: Direction, magnitude: f64) -> f64 {
    match direction {
        Direction::Discharge => magnitude,
        Direction::Charge => -magnitude,
    }
}

fn operating_point(
    params: &SurrogateParams,
    cell: &CellState,
    drive: &Drive,
) -> Result<Operating, SolveError> {
    let ocv = params.ocv(cell.soc);
    let resistance = params.resistance_at(cell.throughput_ah);

    let current = match *drive {
        Drive::Rest => 0.0,
        Drive::Current {
            direction,
            magnitude,
        } => signed(direction, magnitude.amps(params.nominal_capacity_ah)),
        Drive::Voltage { volts } => (ocv - volts) / resistance,
        Drive::Power { direction, watts } => {
            // Solve (ocv - I·R)·I = P for the physical root.
            let power = signed(direction, watts);
            let discriminant = ocv * ocv - 4.0 * resistance * power;
            if discriminant < 0.0 {
                return Err(SolveError::SolverNonConvergence(format!(
                    "{} W cannot be delivered at OCV {:.3} V",
                    watts, ocv
                )));
            }
            (ocv - discriminant.sqrt()) / (2.0 * resistance)
        }
    };

    let limit = params.max_c_rate * params.nominal_capacity_ah;
    if current.abs() > limit {
        return Err(SolveError::SolverNonConvergence(format!(
            "current {:.2} A exceeds {:.1}C",
            current.abs(),
            params.max_c_rate
        )));
    }

    Ok(Operating {
        current,
        voltage: ocv - current * resistance,
        ocv,
        resistance,
    })
}

fn reached(until: Termination, op: &Operating, cell: &CellState, params: &SurrogateParams) -> bool {
    match until {
        Termination::Voltage(target) => {
            if op.current > REST_CURRENT_THRESHOLD {
                op.voltage <= target
            } else if op.current < -REST_CURRENT_THRESHOLD {
                op.voltage >= target
            } else {
                (op.voltage - target).abs() < 1e-6
            }
        }
        Termination::Current(spec) => op.current.abs() <= spec.amps(params.nominal_capacity_ah),
        Termination::StateOfCharge(target) => {
            if op.current > REST_CURRENT_THRESHOLD {
                cell.soc <= target
            } else if op.current < -REST_CURRENT_THRESHOLD {
                cell.soc >= target
            } else {
                (cell.soc - target).abs() < 1e-9
            }
        }
    }
}

#[derive(Debug, Default)]
struct Samples {
    time: Vec<f64>,
    current: Vec<f64>,
    voltage: Vec<f64>,
    ocv: Vec<f64>,
    discharge: Vec<f64>,
    throughput: Vec<f64>,
    soc: Vec<f64>,
    temperature: Vec<f64>,
    resistance: Vec<f64>,
    capacity: Vec<f64>,
}

impl Samples {
    fn record(&mut self, params: &SurrogateParams, cell: &CellState, op: &Operating) {
        self.time.push(cell.time_s);
        self.current.push(op.current);
        self.voltage.push(op.voltage);
        self.ocv.push(op.ocv);
        self.discharge.push(cell.discharge_ah);
        self.throughput.push(cell.throughput_ah);
        self.soc.push(cell.soc);
        self.temperature.push(cell.temperature_k);
        self.resistance.push(op.resistance);
        self.capacity.push(params.capacity_ah(cell.throughput_ah));
    }

    fn into_record(self, step: &Step) -> StepRecord {
        StepRecord::new(step.description.clone())
            .with_time(self.time)
            .with_series(CURRENT, self.current)
            .with_series(VOLTAGE, self.voltage)
            .with_series(OPEN_CIRCUIT_VOLTAGE, self.ocv)
            .with_series(DISCHARGE_CAPACITY, self.discharge)
            .with_series(THROUGHPUT_CAPACITY, self.throughput)
            .with_series(STATE_OF_CHARGE, self.soc)
            .with_series(CELL_TEMPERATURE, self.temperature)
            .with_series(RESISTANCE, self.resistance)
            .with_series(CAPACITY, self.capacity)
    }
}

fn simulate_step(
    params: &SurrogateParams,
    cell: &mut CellState,
    step: &Step,
) -> Result<StepRecord, SolveError> {
    let ambient_k = step.temperature_k.unwrap_or(params.ambient_temperature_k);
    let period = step.period_s.unwrap_or(params.default_period_s);
    let dt = (period / f64::from(params.substeps)).min(params.max_substep_s);
    let limit = step.duration_s.unwrap_or(params.max_step_duration_s);

    let mut samples = Samples::default();
    let mut op = operating_point(params, cell, &step.drive)?;
    samples.record(params, cell, &op);

    // Already satisfied on entry: the step is a single sample.
    if step
        .until
        .is_some_and(|until| reached(until, &op, cell, params))
    {
        return Ok(samples.into_record(step));
    }

    let mut elapsed = 0.0;
    let mut next_record = period;
    loop {
        let h = dt.min(limit - elapsed);
        cell.advance(params, &op, h, ambient_k);
        elapsed += h;
        op = operating_point(params, cell, &step.drive)?;

        let done_by_condition = step
            .until
            .is_some_and(|until| reached(until, &op, cell, params));
        let done_by_time = elapsed >= limit - TIME_EPSILON;

        if done_by_condition || done_by_time || elapsed >= next_record - TIME_EPSILON {
            samples.record(params, cell, &op);
            next_record += period;
        }

        if done_by_condition {
            return Ok(samples.into_record(step));
        }
        if done_by_time {
            if step.duration_s.is_none() {
                return Err(SolveError::TerminationNotReached(format!(
                    "condition not met within {} s",
                    limit
                )));
            }
            return Ok(samples.into_record(step));
        }

        let exhausted = (cell.soc <= 0.0 && op.current > REST_CURRENT_THRESHOLD)
            || (cell.soc >= 1.0 && op.current < -REST_CURRENT_THRESHOLD);
        if exhausted {
            return Err(if step.until.is_some() {
                SolveError::TerminationNotReached(format!(
                    "state of charge limit reached at {:.3} V before the condition",
                    op.voltage
                ))
            } else {
                SolveError::SolverNonConvergence(
                    "state of charge driven outside [0, 1]".to_string(),
                )
            });
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
