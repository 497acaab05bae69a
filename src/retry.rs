//! Conflict retry policy

use std::time::Duration;

use rand::Rng;

/// Bounds and pacing for optimistic-concurrency retries.
///
/// Attempt `n` (1-based) that loses its race waits
/// `initial_backoff * factor^(n-1)`, capped at `max_backoff`, plus up to
/// `jitter` of that delay chosen at random.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of read-mutate-write attempts
    pub max_attempts: u32,
    /// Delay after the first conflict
    pub initial_backoff: Duration,
    /// Growth of the delay per further conflict
    pub factor: f64,
    /// Upper bound of the delay before jitter
    pub max_backoff: Duration,
    /// Fraction of the delay added at random
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            factor: 1.0,
            max_backoff: Duration::from_secs(1),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Retry immediately without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: 0.0,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, factor: f64, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.factor = factor;
        self.max_backoff = max;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Attempts actually made; zero is treated as a single attempt
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after conflict number `attempt`, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.factor.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        if capped.is_nan() || capped <= 0.0 {
            return Duration::ZERO;
        }
        // too large for a Duration
        Duration::try_from_secs_f64(capped)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay after conflict number `attempt`, jittered with `rng`.
    ///
    /// A jitter outside `0.0..=1.0` is clamped; a non-finite one is ignored.
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let extra = Duration::try_from_secs_f64(base.as_secs_f64() * jitter * rng.gen::<f64>())
            .unwrap_or(Duration::ZERO);
        base.saturating_add(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn default_matches_client_retry_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
        assert_eq!(policy.base_delay(1), Duration::from_millis(10));
        assert_eq!(policy.base_delay(4), Duration::from_millis(10));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(10).with_backoff(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(500),
        );
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay(4), Duration::from_millis(500));
        assert_eq!(policy.base_delay(60), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3)
            .with_backoff(Duration::from_millis(100), 1.0, Duration::from_secs(1))
            .with_jitter(0.5);
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=50 {
            let delay = policy.delay(attempt, &mut rng);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(3);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.delay(1, &mut rng), Duration::ZERO);
        assert_eq!(policy.delay(3, &mut rng), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0).attempts(), 1);
        assert_eq!(RetryPolicy::new(4).attempts(), 4);
    }

    #[test]
    fn out_of_range_values_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(3);

        let huge = RetryPolicy::new(3).with_backoff(Duration::MAX, 1.0, Duration::MAX);
        assert_eq!(huge.base_delay(1), Duration::MAX);
        assert_eq!(huge.delay(2, &mut rng), Duration::MAX);

        let huge_jittered = huge.clone().with_jitter(1.0);
        assert_eq!(huge_jittered.delay(1, &mut rng), Duration::MAX);

        let steep = RetryPolicy::new(3).with_backoff(
            Duration::from_secs(1),
            f64::INFINITY,
            Duration::from_secs(30),
        );
        assert_eq!(steep.base_delay(2), Duration::from_secs(30));

        let base = RetryPolicy::new(3)
            .with_backoff(Duration::from_millis(100), 1.0, Duration::from_secs(1));
        for jitter in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -2.0] {
            let policy = base.clone().with_jitter(jitter);
            assert_eq!(policy.delay(1, &mut rng), Duration::from_millis(100));
        }

        let wide = base.with_jitter(7.5);
        let delay = wide.delay(1, &mut rng);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(200));
    }
}
