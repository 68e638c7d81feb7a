//! Retry options for one executor.
//!
//! Options are an explicit value handed to an executor at construction; there is no
//! process-wide default object. [`RetryOptions::default`] is just the value callers get when
//! they do not configure anything:
//!
//! - interval: constant 100ms
//! - max try time: unbounded
//! - max try count: 2 (one try plus one retry)

use crate::interval::{ConstantInterval, IntervalStrategy};
use std::fmt;
use std::time::Duration;

/// Default wait between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Default total number of attempts.
pub const DEFAULT_MAX_TRY_COUNT: usize = 2;

/// Errors produced while validating options.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// `max_try_count` must be >= 1.
    #[error("max_try_count must be >= 1 (got {0})")]
    InvalidMaxTryCount(usize),
}

/// Policy limits and interval strategy for one executor.
pub struct RetryOptions {
    interval: Box<dyn IntervalStrategy>,
    max_try_time: Option<Duration>,
    max_try_count: usize,
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("interval", &self.interval)
            .field("max_try_time", &self.max_try_time)
            .field("max_try_count", &self.max_try_count)
            .finish()
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            interval: Box::new(ConstantInterval::new(DEFAULT_INTERVAL)),
            max_try_time: None,
            max_try_count: DEFAULT_MAX_TRY_COUNT,
        }
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval strategy consulted before each retry.
    pub fn interval<S>(mut self, interval: S) -> Self
    where
        S: IntervalStrategy + 'static,
    {
        self.interval = Box::new(interval);
        self
    }

    /// Stop once this much time has elapsed since the execution started.
    pub fn max_try_time(mut self, max_try_time: Duration) -> Self {
        self.max_try_time = Some(max_try_time);
        self
    }

    /// Remove the elapsed-time bound.
    pub fn unbounded_try_time(mut self) -> Self {
        self.max_try_time = None;
        self
    }

    /// Total attempts (initial try + retries). Must be >= 1.
    pub fn max_try_count(mut self, max_try_count: usize) -> Self {
        self.max_try_count = max_try_count;
        self
    }

    pub fn try_time_limit(&self) -> Option<Duration> {
        self.max_try_time
    }

    pub fn try_count_limit(&self) -> usize {
        self.max_try_count
    }

    /// Check the invariants executors rely on.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_try_count < 1 {
            return Err(OptionsError::InvalidMaxTryCount(self.max_try_count));
        }
        Ok(())
    }

    pub(crate) fn next_interval(&mut self) -> Duration {
        self.interval.next_interval()
    }
}
