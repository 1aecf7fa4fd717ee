//! Property tests for the reconnect backoff schedule.

use std::time::Duration;

use proptest::prelude::*;
use warp_client::Backoff;

fn backoff_strategy() -> impl Strategy<Value = (u64, u64, f64)> {
    // (min ms, max ms, factor) with max comfortably above the jitter window.
    (1u64..1_000, 1.0f64..3.0).prop_map(|(min_ms, factor)| (min_ms, min_ms * 100, factor))
}

proptest! {
    /// Delays never decrease and never exceed the configured maximum.
    #[test]
    fn delays_are_monotonic_and_bounded((min_ms, max_ms, factor) in backoff_strategy()) {
        let min = Duration::from_millis(min_ms);
        let max = Duration::from_millis(max_ms);
        let mut backoff = Backoff::new(min, max, factor);

        let first = backoff.next_delay();
        prop_assert!(first >= min);
        prop_assert!(first < min * 3);

        let mut previous = first;
        for _ in 0..32 {
            let delay = backoff.next_delay();
            prop_assert!(delay >= previous, "delay shrank: {:?} -> {:?}", previous, delay);
            prop_assert!(delay <= max, "delay exceeded cap: {:?} > {:?}", delay, max);
            previous = delay;
        }
    }

    /// A successful connect forgets all progress: the next delay is drawn
    /// from the initial jitter window again.
    #[test]
    fn reset_returns_to_the_jitter_window((min_ms, max_ms, factor) in backoff_strategy()) {
        let min = Duration::from_millis(min_ms);
        let max = Duration::from_millis(max_ms);
        let mut backoff = Backoff::new(min, max, factor);

        for _ in 0..16 {
            backoff.next_delay();
        }
        backoff.reset();
        prop_assert!(!backoff.is_waiting());

        let delay = backoff.next_delay();
        prop_assert!(delay >= min);
        prop_assert!(delay < min * 3);
    }
}
