//! # Primitives
//!
//! Fixed constants for the agechain CORE: series names shared between
//! engines and metric extraction, terminal-state keys, format magic, and
//! the bounds that keep every chain computationally finite.

// =============================================================================
// SERIES NAMES
// =============================================================================

/// Name under which a solution serves its time axis.
pub const TIME: &str = "Time [s]";

/// Cell current, positive while discharging.
pub const CURRENT: &str = "Current [A]";

/// Terminal voltage.
pub const VOLTAGE: &str = "Voltage [V]";

/// Open-circuit voltage.
pub const OPEN_CIRCUIT_VOLTAGE: &str = "Open-circuit voltage [V]";

/// Cumulative discharged charge. Increases while discharging.
pub const DISCHARGE_CAPACITY: &str = "Discharge capacity [A.h]";

/// Cumulative absolute charge throughput.
pub const THROUGHPUT_CAPACITY: &str = "Throughput capacity [A.h]";

/// State of charge as a fraction in [0, 1].
pub const STATE_OF_CHARGE: &str = "State of charge";

/// Lumped cell temperature.
pub const CELL_TEMPERATURE: &str = "Cell temperature [K]";

/// Ohmic resistance of the cell.
pub const RESISTANCE: &str = "Resistance [Ohm]";

/// Remaining usable capacity.
pub const CAPACITY: &str = "Capacity [A.h]";

// =============================================================================
// TERMINAL STATE KEYS
// =============================================================================

/// State-of-charge entry of a terminal state vector.
pub const STATE_SOC: &str = "soc";

/// Temperature entry of a terminal state vector, in kelvin.
pub const STATE_TEMPERATURE: &str = "temperature [K]";

/// Charge throughput entry of a terminal state vector.
pub const STATE_THROUGHPUT: &str = "throughput [A.h]";

/// Cumulative discharge capacity entry of a terminal state vector.
pub const STATE_DISCHARGE_CAPACITY: &str = "discharge capacity [A.h]";

/// Simulation clock entry of a terminal state vector, in seconds.
pub const STATE_TIME: &str = "time [s]";

// =============================================================================
// SNAPSHOT FORMAT
// =============================================================================

/// Magic bytes for the chain snapshot header.
pub const MAGIC_BYTES: &[u8; 4] = b"ACHN";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the payload layout.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// BOUNDS
// =============================================================================

/// Maximum number of repetitions a chain may declare.
pub const MAX_REPETITIONS: usize = 10_000;

/// Maximum number of roles in one repetition.
pub const MAX_ROLES: usize = 64;

/// Maximum number of steps in one parsed experiment.
pub const MAX_EXPERIMENT_STEPS: usize = 100_000;

/// Maximum length of a single step description.
pub const MAX_STEP_LENGTH: usize = 256;

/// Current magnitude below which a sample counts as "at rest".
pub const REST_CURRENT_THRESHOLD: f64 = 1e-9;
