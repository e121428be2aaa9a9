//! Property tests for the stat counter arithmetic.

use proptest::prelude::*;

use verifier_bench::services::stats::{RequestStats, StatCounter};

proptest! {
    /// count/total/shortest/longest stay mutually consistent for any
    /// observation sequence.
    #[test]
    fn counter_aggregates_are_consistent(durations in prop::collection::vec(0.0f64..100.0, 1..200)) {
        let counter = StatCounter::standalone();
        for duration in &durations {
            counter.record(Some(*duration));
        }

        let count = counter.count();
        prop_assert_eq!(count, durations.len() as u64);

        let total = counter.total_duration().unwrap();
        let expected_total: f64 = durations.iter().sum();
        prop_assert!((total - expected_total).abs() < 1e-6);

        let average = counter.average_duration().unwrap();
        let shortest = counter.shortest_duration().unwrap();
        let longest = counter.longest_duration().unwrap();
        prop_assert!((average - total / count as f64).abs() < 1e-9);
        prop_assert!(shortest <= average + 1e-9);
        prop_assert!(average <= longest + 1e-9);

        let min = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let max = durations.iter().copied().fold(0.0f64, f64::max);
        prop_assert!((shortest - min).abs() < 1e-12);
        prop_assert!((longest - max).abs() < 1e-12);
    }

    /// A linked total sees exactly the union of its children's observations.
    #[test]
    fn linked_total_counts_every_child_observation(
        observations in prop::collection::vec((0u8..3, 0.0f64..10.0), 0..200)
    ) {
        let stats = RequestStats::new();
        let mut expected = [0u64; 3];
        for (bin, duration) in &observations {
            let child = match bin {
                0 => &stats.ok,
                1 => &stats.retry,
                _ => &stats.fail,
            };
            child.record(Some(*duration));
            expected[usize::from(*bin).min(2)] += 1;
        }

        prop_assert_eq!(stats.ok.count(), expected[0]);
        prop_assert_eq!(stats.retry.count(), expected[1]);
        prop_assert_eq!(stats.fail.count(), expected[2]);
        prop_assert_eq!(
            stats.all.count(),
            stats.ok.count() + stats.retry.count() + stats.fail.count()
        );

        if !observations.is_empty() {
            let share_sum = stats.ok.percentage().unwrap_or(0.0)
                + stats.retry.percentage().unwrap_or(0.0)
                + stats.fail.percentage().unwrap_or(0.0);
            prop_assert!((share_sum - 1.0).abs() < 1e-9);
        }
    }
}
