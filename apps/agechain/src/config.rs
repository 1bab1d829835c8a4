//! # Chain Configuration
//!
//! TOML description of one aging chain:
//!
//! ```toml
//! name = "sei_aging"
//! repetitions = 4
//!
//! [setup.model]
//! name = "DFN"
//! options = { SEI = "ec reaction limited" }
//!
//! [engine]
//! kind = "surrogate"
//!
//! [[roles]]
//! label = "aging"
//! repeat = 10
//! cycle = ["Charge at 1C until 4.2V", "Hold at 4.2V until C/50", "Discharge at 1C until 3V"]
//!
//! [[roles]]
//! label = "rpt"
//! cycle = ["Discharge at C/5 until 3V", "Charge at 1C until 4.2V"]
//!
//! [metric]
//! role = "aging"
//! step = 2
//! ```
//!
//! [`ChainConfig::into_plan`] validates the file and turns it into the core
//! types the runner needs.

use crate::error::AppError;
use crate::files::validate_file_size;
use agechain_core::primitives::DISCHARGE_CAPACITY;
use agechain_core::{
    ChainLimits, ChainRole, CycleChain, CycleNumbering, CycleProtocol, Experiment, MetricSpec,
    Reduction, RoleLabel, SimulationSetup, SurrogateParams, ThermalGuard,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// FILE MODEL
// =============================================================================

/// One chain, as written in its TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Chain name; used for output file names. Defaults to the file stem.
    #[serde(default)]
    pub name: String,
    /// Outer repetitions.
    pub repetitions: usize,
    /// Model, parameters, mesh, solver.
    #[serde(default)]
    pub setup: SimulationSetup,
    /// Engine selection.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Roles in solve order.
    pub roles: Vec<RoleConfig>,
    /// Per-cycle metric.
    #[serde(default)]
    pub metric: Option<MetricConfig>,
    /// Per-repetition summary.
    #[serde(default)]
    pub summary: Option<SummaryConfig>,
    /// Chain limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Which engine solves the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineConfig {
    /// Built-in empirical engine.
    Surrogate {
        /// Surrogate tunables.
        #[serde(default)]
        params: SurrogateParams,
    },
    /// External simulation service.
    Http {
        /// Base URL; requests go to `{url}/solve`.
        url: String,
        /// Per-request timeout.
        #[serde(default = "default_http_timeout")]
        timeout_secs: u64,
        /// Bearer token; falls back to `AGECHAIN_API_KEY`.
        #[serde(default)]
        api_key: Option<String>,
    },
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Surrogate {
            params: SurrogateParams::default(),
        }
    }
}

impl EngineConfig {
    /// Short name used in logs and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EngineConfig::Surrogate { .. } => "surrogate",
            EngineConfig::Http { .. } => "http",
        }
    }
}

/// One role: a label and its protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    /// Role label.
    pub label: String,
    /// A single cycle, as step strings.
    #[serde(default)]
    pub cycle: Option<Vec<String>>,
    /// Several distinct cycles, as step strings.
    #[serde(default)]
    pub cycles: Option<Vec<Vec<String>>>,
    /// How often the cycle list repeats within one solve.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_repeat() -> usize {
    1
}

/// Per-cycle metric settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricConfig {
    /// Role to reduce.
    pub role: String,
    /// Series to reduce.
    #[serde(default = "default_series")]
    pub series: String,
    /// Step within each cycle; whole cycle when absent.
    #[serde(default)]
    pub step: Option<usize>,
    /// Expected cycles per solve; must equal the role's cycle count.
    #[serde(default)]
    pub cycles_per_repetition: Option<usize>,
    /// Index assignment.
    #[serde(default)]
    pub numbering: CycleNumbering,
    /// Per-cycle reduction.
    #[serde(default)]
    pub reduction: Reduction,
}

/// Per-repetition summary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryConfig {
    /// Role whose last cycle is reduced.
    pub role: String,
    /// Series to reduce.
    #[serde(default = "default_series")]
    pub series: String,
    /// Step within the last cycle; whole cycle when absent.
    #[serde(default)]
    pub step: Option<usize>,
    /// Reduction of the last cycle.
    #[serde(default)]
    pub reduction: Reduction,
}

fn default_series() -> String {
    DISCHARGE_CAPACITY.to_string()
}

/// Chain limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Wall-clock budget for the whole chain.
    #[serde(default)]
    pub wall_clock_secs: Option<u64>,
    /// Thermal guard.
    #[serde(default)]
    pub thermal: Option<ThermalGuard>,
}

// =============================================================================
// PLAN
// =============================================================================

/// Validated, ready-to-run form of a [`ChainConfig`].
#[derive(Debug, Clone)]
pub struct ChainPlan {
    /// Chain name.
    pub name: String,
    /// Roles and repetitions.
    pub chain: CycleChain,
    /// Setup passed to every solve.
    pub setup: SimulationSetup,
    /// Engine selection.
    pub engine: EngineConfig,
    /// Limits.
    pub limits: ChainLimits,
    /// Per-cycle metric.
    pub metric: Option<MetricSpec>,
    /// Per-repetition summary.
    pub summary: Option<SummarySpec>,
}

/// Validated per-repetition summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySpec {
    /// Role whose last cycle is reduced.
    pub role: RoleLabel,
    /// Series to reduce.
    pub series: String,
    /// Step within the last cycle.
    pub step: Option<usize>,
    /// Reduction of the last cycle.
    pub reduction: Reduction,
}

impl ChainConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Read a configuration file; an empty name becomes the file stem.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        validate_file_size(path, MAX_CONFIG_FILE_SIZE)?;
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Io(format!("Failed to read config: {}", e)))?;
        let mut config = Self::from_toml_str(&text)?;
        if config.name.is_empty() {
            config.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(config)
    }

    /// Validate and convert into a plan.
    pub fn into_plan(self) -> Result<ChainPlan, AppError> {
        validate_name(&self.name)?;
        validate_engine(&self.engine)?;

        let roles = self
            .roles
            .iter()
            .map(RoleConfig::to_role)
            .collect::<Result<Vec<_>, _>>()?;
        let chain = CycleChain::new(roles, self.repetitions)?;

        let metric = self
            .metric
            .map(|m| -> Result<MetricSpec, AppError> {
                let role = chain.role(&RoleLabel::new(m.role))?;
                let expected = role.expected_cycles();
                match m.cycles_per_repetition {
                    Some(declared) if declared != expected => {
                        return Err(AppError::Config(format!(
                            "metric.cycles_per_repetition is {} but role '{}' solves {} cycle(s)",
                            declared, role.label, expected
                        )));
                    }
                    _ => {}
                }
                validate_step("metric", role, m.step)?;
                Ok(MetricSpec {
                    role: role.label.clone(),
                    series: m.series,
                    step: m.step,
                    cycles_per_repetition: expected,
                    numbering: m.numbering,
                    reduction: m.reduction,
                })
            })
            .transpose()?;

        let summary = self
            .summary
            .map(|s| -> Result<SummarySpec, AppError> {
                let role = chain.role(&RoleLabel::new(s.role))?;
                validate_step("summary", role, s.step)?;
                Ok(SummarySpec {
                    role: role.label.clone(),
                    series: s.series,
                    step: s.step,
                    reduction: s.reduction,
                })
            })
            .transpose()?;

        if self.limits.wall_clock_secs == Some(0) {
            return Err(AppError::Config(
                "limits.wall_clock_secs must be positive".to_string(),
            ));
        }
        let limits = ChainLimits {
            wall_clock: self.limits.wall_clock_secs.map(Duration::from_secs),
            thermal: self.limits.thermal,
        };

        Ok(ChainPlan {
            name: self.name,
            chain,
            setup: self.setup,
            engine: self.engine,
            limits,
            metric,
            summary,
        })
    }
}

impl RoleConfig {
    fn to_role(&self) -> Result<ChainRole, AppError> {
        let cycles = match (&self.cycle, &self.cycles) {
            (Some(cycle), None) => vec![CycleProtocol::parse(cycle)?],
            (None, Some(cycles)) => cycles
                .iter()
                .map(|c| CycleProtocol::parse(c))
                .collect::<Result<Vec<_>, _>>()?,
            (Some(_), Some(_)) => {
                return Err(AppError::Config(format!(
                    "role '{}' sets both 'cycle' and 'cycles'",
                    self.label
                )));
            }
            (None, None) => {
                return Err(AppError::Config(format!(
                    "role '{}' needs 'cycle' or 'cycles'",
                    self.label
                )));
            }
        };
        let experiment = Experiment::new(cycles)?.repeat(self.repeat)?;
        Ok(ChainRole::new(RoleLabel::new(self.label.as_str()), experiment))
    }
}

fn validate_name(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "chain name '{}' must be non-empty ASCII letters, digits, '_', '-' or '.'",
            name
        )))
    }
}

/// A step window must exist in every cycle of the role.
fn validate_step(section: &str, role: &ChainRole, step: Option<usize>) -> Result<(), AppError> {
    let Some(step) = step else {
        return Ok(());
    };
    let shortest = role
        .experiment
        .cycles()
        .iter()
        .map(CycleProtocol::len)
        .min()
        .unwrap_or(0);
    if step >= shortest {
        return Err(AppError::Config(format!(
            "{}.step {} is out of range: role '{}' has cycles of {} step(s)",
            section, step, role.label, shortest
        )));
    }
    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), AppError> {
    match engine {
        EngineConfig::Surrogate { params } => params.validate().map_err(AppError::from),
        EngineConfig::Http {
            url, timeout_secs, ..
        } => {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| AppError::Config(format!("invalid engine url '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::Config(format!(
                    "engine url '{}' must use http or https",
                    url
                )));
            }
            if *timeout_secs == 0 {
                return Err(AppError::Config(
                    "engine timeout_secs must be positive".to_string(),
                ));
            }
            Ok(())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
