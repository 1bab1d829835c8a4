//! # Thermal Guard
//!
//! Post-solve inspection that stops a chain once the cell runs hot or
//! heats too fast. The tripping solution is still stored; the guard only
//! prevents the next solve.

use crate::metrics::gradient;
use crate::primitives::{CELL_TEMPERATURE, TIME};
use crate::solution::Solution;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits checked against a temperature series after every solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalGuard {
    /// Series holding the temperature in kelvin.
    #[serde(default = "default_temperature_series")]
    pub temperature_series: String,
    /// Highest temperature allowed.
    #[serde(default)]
    pub max_temperature_k: Option<f64>,
    /// Highest heating rate allowed.
    #[serde(default)]
    pub max_heating_rate_k_per_s: Option<f64>,
}

fn default_temperature_series() -> String {
    CELL_TEMPERATURE.to_string()
}

impl Default for ThermalGuard {
    fn default() -> Self {
        Self {
            temperature_series: default_temperature_series(),
            max_temperature_k: None,
            max_heating_rate_k_per_s: None,
        }
    }
}

/// Why a guard tripped.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum GuardTrip {
    /// Temperature went above its limit.
    #[error("temperature {observed:.2} K above limit {limit:.2} K")]
    Temperature {
        /// Maximum seen.
        observed: f64,
        /// Configured limit.
        limit: f64,
    },

    /// Heating rate went above its limit.
    #[error("heating rate {observed:.4} K/s above limit {limit:.4} K/s")]
    HeatingRate {
        /// Maximum seen.
        observed: f64,
        /// Configured limit.
        limit: f64,
    },

    /// The solution has no usable temperature series.
    #[error("temperature series '{0}' unavailable")]
    MissingSeries(String),
}

impl ThermalGuard {
    /// Inspect a solution; `Some` when a limit is exceeded.
    #[must_use]
    pub fn inspect(&self, solution: &Solution) -> Option<GuardTrip> {
        if self.max_temperature_k.is_none() && self.max_heating_rate_k_per_s.is_none() {
            return None;
        }
        let missing = || GuardTrip::MissingSeries(self.temperature_series.clone());
        let Ok(temperature) = solution.series(&self.temperature_series) else {
            return Some(missing());
        };
        if temperature.is_empty() {
            return Some(missing());
        }

        if let Some(limit) = self.max_temperature_k {
            let observed = temperature.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if observed > limit {
                return Some(GuardTrip::Temperature { observed, limit });
            }
        }

        if let Some(limit) = self.max_heating_rate_k_per_s {
            let time = solution.series(TIME).ok()?;
            let Ok(rates) = gradient(temperature, time) else {
                return Some(missing());
            };
            let observed = rates.into_iter().fold(f64::NEG_INFINITY, f64::max);
            if observed > limit {
                return Some(GuardTrip::HeatingRate { observed, limit });
            }
        }
        None
    }
}
