//! Per-execution attempt bookkeeping.

use std::time::Duration;

/// Attempt counters and elapsed time of one retry execution.
///
/// The executor owns the live copy. Hooks receive a copy taken at the moment they are
/// invoked, so nothing a hook does with its context can affect the running loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryContext {
    /// Attempts started so far, 1-based.
    pub tried_count: usize,
    /// Retries performed so far (`tried_count - 1` once a retry happened).
    pub retry_count: usize,
    /// Time elapsed since the execution started, refreshed once per iteration.
    pub tried_time: Duration,
}

impl RetryContext {
    pub fn new(tried_count: usize, retry_count: usize, tried_time: Duration) -> Self {
        Self { tried_count, retry_count, tried_time }
    }

    /// Whether the current attempt is a retry rather than the first try.
    pub fn is_retry(&self) -> bool {
        self.tried_count > 1
    }

    pub(crate) fn begin_attempt(&mut self, elapsed: Duration) {
        self.tried_count += 1;
        self.tried_time = elapsed;
        if self.is_retry() {
            self.retry_count = self.tried_count - 1;
        }
    }
}
