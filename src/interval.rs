//! Interval strategies deciding how long to wait before each retry.
//!
//! A strategy is asked for the next interval once per retry; the first attempt never waits.
//! Strategies may be stateful ([`ExponentialInterval`] remembers how often it was asked and what
//! it returned last), so one instance belongs to one retry execution at a time. Sharing a
//! stateful instance between concurrent executions is the caller's responsibility.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use retrier::{ConstantInterval, ExponentialInterval, IntervalStrategy};
//!
//! let mut constant = ConstantInterval::new(Duration::from_millis(100));
//! assert_eq!(constant.next_interval(), Duration::from_millis(100));
//!
//! let mut exponential = ExponentialInterval::new(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! let first = exponential.next_interval();
//! assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(110));
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::Duration;

/// Ceiling used when no explicit maximum is configured (1 day).
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound (exclusive) of the positive jitter fraction added to exponential intervals.
const MAX_JITTER: f64 = 0.1;

/// Errors returned by interval configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntervalError {
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= initial ({initial:?})")]
    MaxLessThanInitial { initial: Duration, max: Duration },
}

/// Generator of the delay before the next attempt.
pub trait IntervalStrategy: Send + fmt::Debug {
    /// Produce the delay for the upcoming retry.
    fn next_interval(&mut self) -> Duration;
}

impl<S: IntervalStrategy + ?Sized> IntervalStrategy for Box<S> {
    fn next_interval(&mut self) -> Duration {
        (**self).next_interval()
    }
}

/// Always waits the same amount of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantInterval {
    interval: Duration,
}

impl ConstantInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl IntervalStrategy for ConstantInterval {
    fn next_interval(&mut self) -> Duration {
        self.interval
    }
}

/// Roughly doubling interval with up to 10% positive jitter, capped at `max`.
///
/// Call `n` yields `initial * (2^n - 1) * (1 + j)` with `j` uniform in `[0, 0.1)`, clamped to
/// `max`. Once a returned interval reaches `max` the strategy is saturated and keeps returning
/// that value for the rest of its life.
#[derive(Debug, Clone)]
pub struct ExponentialInterval {
    initial: Duration,
    max: Duration,
    attempt_count: u32,
    previous: Duration,
    rng: StdRng,
}

impl ExponentialInterval {
    /// Create an exponential strategy starting at `initial`, effectively uncapped.
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            max: MAX_INTERVAL.max(initial),
            attempt_count: 0,
            previous: initial,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Cap the interval. Returns an error if `max` is zero or smaller than `initial`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, IntervalError> {
        if max.is_zero() {
            return Err(IntervalError::MaxMustBePositive);
        }
        if max < self.initial {
            return Err(IntervalError::MaxLessThanInitial { initial: self.initial, max });
        }
        self.max = max;
        Ok(self)
    }

    /// Seed the jitter RNG for reproducible sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Number of intervals handed out so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

impl IntervalStrategy for ExponentialInterval {
    fn next_interval(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);

        if self.previous >= self.max {
            return self.previous;
        }
        if self.initial.is_zero() {
            return Duration::ZERO;
        }

        let jitter: f64 = self.rng.random_range(0.0..MAX_JITTER);
        let exponent = self.attempt_count.min(i32::MAX as u32) as i32;
        let delta = (2f64.powi(exponent) - 1.0) * (1.0 + jitter);
        // powi overflows to infinity long before MAX_INTERVAL matters; min() clamps it
        let candidate = (self.initial.as_secs_f64() * delta).min(self.max.as_secs_f64());

        self.previous = Duration::from_secs_f64(candidate).min(self.max);
        self.previous
    }
}
