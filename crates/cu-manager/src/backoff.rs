//! Capped exponential backoff for retrying failed reconcile passes

use crate::config::ReconcilerConfig;
use std::time::Duration;

/// Delay schedule `initial * multiplier^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
            failures: 0,
        }
    }

    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.backoff_initial_secs),
            Duration::from_secs(config.backoff_max_secs),
            config.backoff_multiplier,
        )
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.multiplier.powi(self.failures.min(64) as i32);
        self.failures = self.failures.saturating_add(1);
        let secs = self.initial.as_secs_f64() * exp;
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Forget previous failures
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_doubles_until_cap() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(30), 2.0);
        assert_eq!(b.next_delay(), Duration::from_secs(5));
        assert_eq!(b.next_delay(), Duration::from_secs(10));
        assert_eq!(b.next_delay(), Duration::from_secs(20));
        assert_eq!(b.next_delay(), Duration::from_secs(30));
        assert_eq!(b.next_delay(), Duration::from_secs(30));
        assert_eq!(b.failures(), 5);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 3.0);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    proptest! {
        #[test]
        fn prop_delay_is_monotonic_and_capped(
            initial in 1u64..60,
            max in 1u64..3600,
            multiplier in 1.0f64..4.0,
            steps in 1usize..200,
        ) {
            let mut b = Backoff::new(
                Duration::from_secs(initial),
                Duration::from_secs(max),
                multiplier,
            );
            let cap = Duration::from_secs(max.max(initial));
            let mut previous = Duration::ZERO;
            for _ in 0..steps {
                let d = b.next_delay();
                prop_assert!(d <= cap);
                prop_assert!(d >= previous);
                previous = d;
            }
        }
    }
}
