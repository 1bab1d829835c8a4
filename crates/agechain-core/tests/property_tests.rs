//! # Property-Based Tests
//!
//! Invariants of parsing, numbering and solution construction checked with
//! proptest.

use agechain_core::{
    CurrentSpec, Direction, Drive, Solution, StepRecord, Termination, global_cycle_index,
    gradient, parse_step, window_delta,
};
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Global indices over (M, C) are exactly 1..=M*C in order.
    #[test]
    fn global_index_is_gap_free(repetitions in 0usize..20, cycles in 1usize..20) {
        let indices: Vec<u64> = (0..repetitions)
            .flat_map(|i| (0..cycles).map(move |j| global_cycle_index(i, cycles, j)))
            .collect();
        let expected: Vec<u64> = (1..=(repetitions * cycles) as u64).collect();
        prop_assert_eq!(indices, expected);
    }

    /// Delta is last minus first, whatever lies between.
    #[test]
    fn delta_ignores_interior(
        first in -1e3f64..1e3,
        interior in vec(-1e3f64..1e3, 0..20),
        last in -1e3f64..1e3,
    ) {
        let mut series = vec![first];
        series.extend(interior);
        series.push(last);
        prop_assert_eq!(window_delta(&series).expect("delta"), last - first);
    }

    /// A linear series has a constant gradient equal to its slope.
    #[test]
    fn gradient_of_linear_series(
        slope in -10.0f64..10.0,
        steps in vec(0.5f64..5.0, 1..30),
    ) {
        let mut time = vec![0.0];
        for dt in &steps {
            let next = time.last().copied().unwrap_or_default() + dt;
            time.push(next);
        }
        let values: Vec<f64> = time.iter().map(|t| slope * t).collect();
        let g = gradient(&values, &time).expect("gradient");
        prop_assert!(g.iter().all(|d| (d - slope).abs() < 1e-9));
    }

    /// Current steps parse back to the numbers they were written with.
    #[test]
    fn current_step_parses_its_numbers(
        rate in 1u32..100,
        millivolts in 2500u32..4300,
        charge in any::<bool>(),
    ) {
        let c_rate = f64::from(rate) / 10.0;
        let volts = f64::from(millivolts) / 1000.0;
        let verb = if charge { "Charge" } else { "Discharge" };
        let text = format!("{} at {}C until {}V", verb, c_rate, volts);

        let step = parse_step(&text).expect("parse");
        let direction = if charge { Direction::Charge } else { Direction::Discharge };
        prop_assert_eq!(
            step.drive,
            Drive::Current { direction, magnitude: CurrentSpec::CRate(c_rate) }
        );
        prop_assert_eq!(step.until, Some(Termination::Voltage(volts)));
        prop_assert_eq!(step.to_string(), text);
    }

    /// The parser never panics, whatever it is fed.
    #[test]
    fn parser_total_on_arbitrary_input(input in ".{0,300}") {
        let _ = parse_step(&input);
    }

    /// Built solutions cover every pushed sample and stay valid.
    #[test]
    fn builder_accounts_for_every_sample(lengths in vec(vec(1usize..8, 1..4), 1..6)) {
        let mut builder = Solution::builder();
        let mut t = 0.0;
        for cycle in &lengths {
            builder.start_cycle().expect("cycle");
            for &len in cycle {
                let time: Vec<f64> = (0..len).map(|k| t + k as f64).collect();
                t += len as f64;
                let values = vec![1.0; len];
                builder
                    .push_step(StepRecord::new("step").with_time(time).with_series("x", values))
                    .expect("step");
            }
        }
        let sol = builder.build().expect("build");

        let total: usize = lengths.iter().flatten().sum();
        prop_assert_eq!(sol.sample_count(), total);
        prop_assert_eq!(sol.cycle_count(), lengths.len());
        prop_assert!(sol.validate().is_ok());
        for (cycle, expected) in sol.cycles().zip(&lengths) {
            let lens: Vec<usize> = cycle.steps().map(|s| s.len()).collect();
            prop_assert_eq!(&lens, expected);
        }
    }
}
