//! Property-based tests for sample aggregation.
//!
//! Uses proptest to verify the invariants that must hold for every
//! non-empty sample sequence:
//! - fastest ≤ average ≤ slowest
//! - stddev ≥ 0, and stddev == 0 exactly when all samples are equal
//! - aggregation is order-independent

use std::time::Duration;

use proptest::prelude::*;

use hipbench::Stats;

// Naive summation accumulates rounding on the order of a few ulps per
// sample; comparisons below allow for that.
const REL_TOLERANCE: f64 = 1e-9;

fn arb_samples() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..1e9, 1..200)
}

proptest! {
    #[test]
    fn average_sits_between_extremes(samples in arb_samples()) {
        let stats = Stats::from_samples(&samples);
        let slack = stats.slowest.abs() * REL_TOLERANCE;
        prop_assert!(stats.fastest <= stats.average + slack);
        prop_assert!(stats.average <= stats.slowest + slack);
    }

    #[test]
    fn stddev_is_non_negative(samples in arb_samples()) {
        let stats = Stats::from_samples(&samples);
        prop_assert!(stats.stddev >= 0.0);
    }

    #[test]
    fn identical_samples_have_zero_spread(raw in 0u64..1_000_000_000, count in 1usize..100) {
        // Integer-valued samples keep the running sum exact, so the mean
        // equals the sample and every spread term cancels to exactly zero.
        let value = raw as f64;
        let samples = vec![value; count];
        let stats = Stats::from_samples(&samples);
        prop_assert_eq!(stats.fastest, value);
        prop_assert_eq!(stats.slowest, value);
        prop_assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn unequal_samples_have_positive_stddev(
        base in 0.0f64..1e9,
        delta in 1.0f64..1e6,
        count in 2usize..100,
    ) {
        let mut samples = vec![base; count];
        samples[0] = base + delta;
        let stats = Stats::from_samples(&samples);
        prop_assert!(stats.stddev > 0.0);
    }

    #[test]
    fn aggregation_is_order_independent(samples in arb_samples()) {
        let stats = Stats::from_samples(&samples);
        let mut reversed = samples.clone();
        reversed.reverse();
        let stats_rev = Stats::from_samples(&reversed);
        prop_assert_eq!(stats.fastest, stats_rev.fastest);
        prop_assert_eq!(stats.slowest, stats_rev.slowest);
        let avg_diff = (stats.average - stats_rev.average).abs();
        prop_assert!(avg_diff <= stats.average.abs() * REL_TOLERANCE);
    }

    #[test]
    fn duration_samples_match_scalar_aggregation(
        nanos in prop::collection::vec(1u64..1_000_000_000, 1..100),
    ) {
        let durations: Vec<Duration> = nanos.iter().map(|&n| Duration::from_nanos(n)).collect();
        let scalars: Vec<f64> = durations.iter().map(|d| d.as_secs_f64()).collect();

        let from_durations = Stats::from_samples(&durations);
        let from_scalars = Stats::from_samples(&scalars);

        prop_assert_eq!(from_durations.fastest.as_secs_f64(), *scalars.iter().min_by(|a, b| a.total_cmp(b)).unwrap());
        let avg_diff = (from_durations.average.as_secs_f64() - from_scalars.average).abs();
        prop_assert!(avg_diff <= from_scalars.average * REL_TOLERANCE + 1e-12);
    }
}
