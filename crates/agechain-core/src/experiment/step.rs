//! # Protocol Steps
//!
//! Parser for the textual step language used to describe cycling
//! protocols, e.g. `"Charge at 1C until 4.2V"`, `"Hold at 4.2 V until
//! C/100 (5 minute period)"`, `"Rest for 1 hour"`.
//!
//! A step is read right to left: the optional `(N unit period)` suffix,
//! the optional ` at <temperature>` suffix, the `until`/`for` conditions,
//! and finally the instruction head.

use crate::ChainError;
use crate::primitives::MAX_STEP_LENGTH;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// STEP MODEL
// =============================================================================

/// Direction of charge flow for current and power steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Current flows into the cell.
    Charge,
    /// Current flows out of the cell.
    Discharge,
}

/// A current magnitude, either relative to nominal capacity or absolute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CurrentSpec {
    /// Multiple of the nominal capacity per hour.
    CRate(f64),
    /// Absolute current in amperes.
    Amps(f64),
}

impl CurrentSpec {
    /// Resolve to amperes for a cell of the given nominal capacity.
    #[must_use]
    pub fn amps(&self, nominal_capacity_ah: f64) -> f64 {
        match self {
            CurrentSpec::CRate(rate) => rate * nominal_capacity_ah,
            CurrentSpec::Amps(amps) => *amps,
        }
    }
}

/// What the step imposes on the cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Drive {
    /// Constant current.
    Current {
        /// Charge or discharge.
        direction: Direction,
        /// Current magnitude.
        magnitude: CurrentSpec,
    },
    /// Constant power.
    Power {
        /// Charge or discharge.
        direction: Direction,
        /// Power magnitude in watts.
        watts: f64,
    },
    /// Constant terminal voltage.
    Voltage {
        /// Held voltage.
        volts: f64,
    },
    /// Zero current.
    Rest,
}

/// Condition that ends a step early.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// Terminal voltage reaches this value.
    Voltage(f64),
    /// Current magnitude falls to this value.
    Current(CurrentSpec),
    /// State of charge reaches this fraction.
    StateOfCharge(f64),
}

/// One parsed protocol step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Imposed quantity.
    pub drive: Drive,
    /// Maximum duration in seconds.
    pub duration_s: Option<f64>,
    /// Early termination condition.
    pub until: Option<Termination>,
    /// Output sampling period in seconds.
    pub period_s: Option<f64>,
    /// Ambient temperature override in kelvin.
    pub temperature_k: Option<f64>,
    /// The text the step was parsed from.
    pub description: String,
}

impl Step {
    /// Parse a step from its textual form.
    pub fn parse(input: &str) -> Result<Self, ChainError> {
        parse_step(input)
    }

    fn validate(&self) -> Result<(), String> {
        match self.drive {
            Drive::Rest => {
                if self.duration_s.is_none() {
                    return Err("rest needs a duration".to_string());
                }
            }
            Drive::Voltage { volts } => {
                if volts <= 0.0 {
                    return Err("held voltage must be positive".to_string());
                }
                if matches!(self.until, Some(Termination::Voltage(_))) {
                    return Err("a voltage hold cannot terminate on a voltage".to_string());
                }
                if self.duration_s.is_none() && self.until.is_none() {
                    return Err("hold needs a duration or a termination".to_string());
                }
            }
            Drive::Current { magnitude, .. } => {
                let value = match magnitude {
                    CurrentSpec::CRate(v) | CurrentSpec::Amps(v) => v,
                };
                if value <= 0.0 {
                    return Err("current must be positive".to_string());
                }
                if self.duration_s.is_none() && self.until.is_none() {
                    return Err("current step needs a duration or a termination".to_string());
                }
            }
            Drive::Power { watts, .. } => {
                if watts <= 0.0 {
                    return Err("power must be positive".to_string());
                }
                if self.duration_s.is_none() && self.until.is_none() {
                    return Err("power step needs a duration or a termination".to_string());
                }
            }
        }

        match self.until {
            Some(Termination::Voltage(v)) if v <= 0.0 => {
                Err("termination voltage must be positive".to_string())
            }
            Some(Termination::Current(CurrentSpec::CRate(v) | CurrentSpec::Amps(v)))
                if v <= 0.0 =>
            {
                Err("termination current must be positive".to_string())
            }
            Some(Termination::StateOfCharge(soc)) if !(0.0..=1.0).contains(&soc) => {
                Err("state of charge must lie between 0% and 100%".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for Step {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_step(s)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

// =============================================================================
// PARSER
// =============================================================================

/// Parse a step from its textual form.
pub fn parse_step(input: &str) -> Result<Step, ChainError> {
    let invalid = |reason: String| ChainError::InvalidStep {
        input: input.to_string(),
        reason,
    };

    let text = input.trim();
    if text.is_empty() {
        return Err(invalid("empty step".to_string()));
    }
    if text.len() > MAX_STEP_LENGTH {
        return Err(invalid(format!(
            "step longer than {} characters",
            MAX_STEP_LENGTH
        )));
    }

    let (text, period_s) = split_period(text).map_err(invalid)?;
    let (text, temperature_k) = split_temperature(text).map_err(invalid)?;
    let (head, duration_s, until) = split_conditions(text).map_err(invalid)?;
    let drive = parse_head(head).map_err(invalid)?;

    let step = Step {
        drive,
        duration_s,
        until,
        period_s,
        temperature_k,
        description: text_for_display(input),
    };
    step.validate().map_err(invalid)?;
    Ok(step)
}

fn text_for_display(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip a trailing `(N unit period)`.
fn split_period(text: &str) -> Result<(&str, Option<f64>), String> {
    if !text.ends_with(')') {
        return Ok((text, None));
    }
    let open = text
        .rfind('(')
        .ok_or_else(|| "unbalanced parenthesis".to_string())?;
    let inner = text[open + 1..text.len() - 1].trim();
    let duration = inner
        .strip_suffix("period")
        .ok_or_else(|| format!("unexpected suffix '({inner})', expected a period"))?;
    let seconds = parse_duration(duration.trim())?;
    Ok((text[..open].trim_end(), Some(seconds)))
}

/// Strip a trailing ` at <temperature>`; leaves `Charge at 1C` untouched.
fn split_temperature(text: &str) -> Result<(&str, Option<f64>), String> {
    let Some(idx) = text.rfind(" at ") else {
        return Ok((text, None));
    };
    let candidate = text[idx + 4..].trim();
    match parse_temperature(candidate) {
        Some(kelvin) => {
            let kelvin = kelvin?;
            Ok((text[..idx].trim_end(), Some(kelvin)))
        }
        None => Ok((text, None)),
    }
}

/// `None` when the text is not a temperature at all.
fn parse_temperature(text: &str) -> Option<Result<f64, String>> {
    let (number, offset) = if let Some(n) = text.strip_suffix("°C") {
        (n, 273.15)
    } else if let Some(n) = text.strip_suffix("oC") {
        (n, 273.15)
    } else if let Some(n) = text.strip_suffix('K') {
        (n, 0.0)
    } else {
        return None;
    };
    Some(parse_number(number.trim()).and_then(|value| {
        let kelvin = value + offset;
        if kelvin > 0.0 {
            Ok(kelvin)
        } else {
            Err(format!("temperature '{text}' is below absolute zero"))
        }
    }))
}

type Conditions<'a> = (&'a str, Option<f64>, Option<Termination>);

fn split_conditions(text: &str) -> Result<Conditions<'_>, String> {
    if let Some((before, condition)) = text.split_once(" until ") {
        let until = parse_termination(condition.trim())?;
        let before = before.trim_end();
        let (head, duration) = match before.strip_suffix(" or") {
            Some(rest) => {
                let (head, duration) = rest
                    .split_once(" for ")
                    .ok_or_else(|| "'or until' must follow 'for <duration>'".to_string())?;
                (head, Some(parse_duration(duration.trim())?))
            }
            None => {
                if before.contains(" for ") {
                    return Err("combine a duration and a condition as 'for <duration> or until <condition>'".to_string());
                }
                (before, None)
            }
        };
        return Ok((head.trim(), duration, Some(until)));
    }

    if let Some((head, duration)) = text.split_once(" for ") {
        return Ok((head.trim(), Some(parse_duration(duration.trim())?), None));
    }

    Ok((text.trim(), None, None))
}

fn parse_head(head: &str) -> Result<Drive, String> {
    let (verb, value) = match head.split_once(" at ") {
        Some((verb, value)) => (verb.trim(), Some(value.trim())),
        None => (head.trim(), None),
    };

    match (verb.to_ascii_lowercase().as_str(), value) {
        ("rest" | "relax", None) => Ok(Drive::Rest),
        ("charge" | "discharge", Some(value)) => {
            let direction = if verb.eq_ignore_ascii_case("charge") {
                Direction::Charge
            } else {
                Direction::Discharge
            };
            match parse_quantity(value)? {
                Quantity::CRate(rate) => Ok(Drive::Current {
                    direction,
                    magnitude: CurrentSpec::CRate(rate),
                }),
                Quantity::Amps(amps) => Ok(Drive::Current {
                    direction,
                    magnitude: CurrentSpec::Amps(amps),
                }),
                Quantity::Watts(watts) => Ok(Drive::Power { direction, watts }),
                _ => Err(format!(
                    "'{value}' is not a C-rate, current or power"
                )),
            }
        }
        ("hold", Some(value)) => match parse_quantity(value)? {
            Quantity::Volts(volts) => Ok(Drive::Voltage { volts }),
            _ => Err(format!("hold needs a voltage, got '{value}'")),
        },
        ("rest" | "relax", Some(_)) => Err("rest takes no 'at' value".to_string()),
        ("charge" | "discharge" | "hold", None) => Err(format!("'{verb}' needs an 'at' value")),
        (other, _) => Err(format!("unknown instruction '{other}'")),
    }
}

fn parse_termination(text: &str) -> Result<Termination, String> {
    match parse_quantity(text)? {
        Quantity::Volts(volts) => Ok(Termination::Voltage(volts)),
        Quantity::CRate(rate) => Ok(Termination::Current(CurrentSpec::CRate(rate))),
        Quantity::Amps(amps) => Ok(Termination::Current(CurrentSpec::Amps(amps))),
        Quantity::SocFraction(soc) => Ok(Termination::StateOfCharge(soc)),
        Quantity::Watts(_) => Err(format!("cannot terminate on a power '{text}'")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Quantity {
    CRate(f64),
    Amps(f64),
    Watts(f64),
    Volts(f64),
    SocFraction(f64),
}

fn parse_quantity(text: &str) -> Result<Quantity, String> {
    let text = text.trim();
    if let Some(denominator) = text.strip_prefix("C/") {
        let denominator = parse_number(denominator.trim())?;
        if denominator <= 0.0 {
            return Err(format!("invalid C-rate '{text}'"));
        }
        return Ok(Quantity::CRate(1.0 / denominator));
    }

    let (number, unit) = split_number(text);
    let value = parse_number(number)?;
    match unit.trim() {
        "C" => Ok(Quantity::CRate(value)),
        "A" => Ok(Quantity::Amps(value)),
        "mA" => Ok(Quantity::Amps(value / 1000.0)),
        "W" => Ok(Quantity::Watts(value)),
        "mW" => Ok(Quantity::Watts(value / 1000.0)),
        "V" => Ok(Quantity::Volts(value)),
        "mV" => Ok(Quantity::Volts(value / 1000.0)),
        "% SOC" | "%SOC" | "%" => Ok(Quantity::SocFraction(value / 100.0)),
        "" => Err(format!("'{text}' has no unit")),
        other => Err(format!("unknown unit '{other}'")),
    }
}

fn parse_duration(text: &str) -> Result<f64, String> {
    let (number, unit) = split_number(text);
    let value = parse_number(number)?;
    let scale = match unit.trim() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "" => return Err(format!("duration '{text}' has no unit")),
        other => return Err(format!("unknown time unit '{other}'")),
    };
    let seconds = value * scale;
    if seconds <= 0.0 {
        return Err(format!("duration '{text}' must be positive"));
    }
    Ok(seconds)
}

fn split_number(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(text.len());
    text.split_at(end)
}

fn parse_number(text: &str) -> Result<f64, String> {
    if text.is_empty() {
        return Err("missing number".to_string());
    }
    let value: f64 = text
        .parse()
        .map_err(|_| format!("'{text}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("'{text}' is not finite"));
    }
    Ok(value)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Step {
        Step::parse(text).expect("parse step")
    }

    #[test]
    fn cc_charge_until_voltage() {
        let step = parse("Charge at 1C until 4.2V");
        assert_eq!(
            step.drive,
            Drive::Current {
                direction: Direction::Charge,
                magnitude: CurrentSpec::CRate(1.0)
            }
        );
        assert_eq!(step.until, Some(Termination::Voltage(4.2)));
        assert_eq!(step.duration_s, None);
        assert_eq!(step.period_s, None);
    }

    #[test]
    fn hold_until_fractional_c_rate_with_period() {
        let step = parse("Hold at 4.2 V until C/100 (5 minute period)");
        assert_eq!(step.drive, Drive::Voltage { volts: 4.2 });
        assert_eq!(
            step.until,
            Some(Termination::Current(CurrentSpec::CRate(0.01)))
        );
        assert_eq!(step.period_s, Some(300.0));
    }

    #[test]
    fn rest_durations() {
        assert_eq!(parse("Rest for 1 hour").duration_s, Some(3600.0));
        assert_eq!(parse("Rest for 300 seconds").duration_s, Some(300.0));
        assert_eq!(
            parse("Rest for 4 hours (5 minute period)").duration_s,
            Some(14_400.0)
        );
    }

    #[test]
    fn soc_termination_with_temperature() {
        let step = parse("Charge at 3C until 90% SOC at 0°C");
        assert_eq!(step.until, Some(Termination::StateOfCharge(0.9)));
        assert_eq!(step.temperature_k, Some(273.15));
    }

    #[test]
    fn duration_or_condition() {
        let step = parse("Discharge at 1C for 1 hour or until 3.3 V");
        assert_eq!(step.duration_s, Some(3600.0));
        assert_eq!(step.until, Some(Termination::Voltage(3.3)));
    }

    #[test]
    fn power_and_absolute_current() {
        let step = parse("Discharge at 5 W for 10 minutes");
        assert_eq!(
            step.drive,
            Drive::Power {
                direction: Direction::Discharge,
                watts: 5.0
            }
        );
        let step = parse("Hold at 4.1 V until 50 mA");
        assert_eq!(
            step.until,
            Some(Termination::Current(CurrentSpec::Amps(0.05)))
        );
    }

    #[test]
    fn rejects_malformed_steps() {
        for text in [
            "",
            "Rest",
            "Charge at 1C",
            "Hold at 4.2V until 4.1V",
            "Charge at 1X until 4.2V",
            "Dance at 1C until 4.2V",
            "Charge at 1C until 4.2V (5 minute)",
            "Discharge at 1C for 1 hour until 3V",
            "Charge at -1C until 4.2V",
            "Charge at 1C until 150% SOC",
        ] {
            assert!(
                matches!(Step::parse(text), Err(ChainError::InvalidStep { .. })),
                "expected rejection of {text:?}"
            );
        }
    }

    #[test]
    fn description_preserves_text() {
        let step = parse("  Charge at 1C   until 4.2V ");
        assert_eq!(step.to_string(), "Charge at 1C until 4.2V");
    }

    #[test]
    fn c_rate_resolves_against_capacity() {
        assert_eq!(CurrentSpec::CRate(0.5).amps(5.0), 2.5);
        assert_eq!(CurrentSpec::Amps(2.0).amps(5.0), 2.0);
    }
}
