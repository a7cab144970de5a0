//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Runtime helpers supporting the monitoring pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use parking_lot::Mutex;
use pvmon_common::MetricsConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Exponential backoff with additive jitter for transient failures.
#[derive(Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubled for each further attempt.
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to every delay.
    pub jitter: Duration,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
            rng: Mutex::new(StdRng::seed_from_u64(0x5EED_u64)),
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(
            config.retry_attempts,
            config.retry_base_delay,
            config.retry_jitter,
        )
    }

    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let exponent = (attempt.saturating_sub(1) as u32).min(8);
        let base = self.base_delay.mul_f64(2u32.pow(exponent) as f64);
        if self.jitter.is_zero() {
            base
        } else {
            let bound = self.jitter.as_millis().max(1) as u64;
            let jitter_ms = self.rng.lock().gen_range(0..=bound);
            base + Duration::from_millis(jitter_ms)
        }
    }
}

impl Clone for RetryPolicy {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            jitter: self.jitter,
            rng: Mutex::new(self.rng.lock().clone()),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(500), Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(20))
            .with_seed(7);
        for attempt in 1..=3 {
            let delay = policy.backoff_delay(attempt);
            let base = Duration::from_millis(100 * 2u64.pow(attempt as u32 - 1));
            assert!(delay >= base && delay <= base + Duration::from_millis(20));
        }
    }
}
