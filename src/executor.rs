//! Retry executors.
//!
//! Semantics shared by [`RetryExecutor`](blocking::RetryExecutor) and
//! [`AsyncRetryExecutor`](suspending::AsyncRetryExecutor):
//! - `tried_count` is 1-based and grows by one per attempt; attempts never exceed
//!   `max_try_count`.
//! - The first attempt runs immediately. Every later attempt first runs the retry hooks, then
//!   waits for the next interval.
//! - A retryable operation failure is swallowed and the loop continues; a non-retryable one
//!   ends the execution with [`RetryError::Operation`].
//! - An optional acceptance condition may reject a successful value, which continues the loop
//!   like a retryable failure.
//! - Before continuing, the bounds are checked in order: elapsed time, attempt count, then (async
//!   only) cancellation.
//! - A success that passes acceptance runs the success hooks and returns. Every other ending
//!   runs the failure hooks, except a failing success hook, which returns straight away.
//! - A failing failure hook replaces the terminal error with
//!   [`RetryError::FailureCallback`]; the original error is dropped.

pub mod blocking;
pub mod suspending;

use crate::classify::ErrorClassifier;
use crate::clock::{Clock, MonotonicClock, Stopwatch};
use crate::context::RetryContext;
use crate::error::RetryError;
use crate::hooks::CallbackRegistry;
use crate::options::RetryOptions;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Policy pieces shared by both executor flavours.
pub(crate) struct Core<T, E> {
    pub(crate) options: RetryOptions,
    pub(crate) classifier: ErrorClassifier<E>,
    pub(crate) hooks: CallbackRegistry<T, E>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
}

impl<T, E> fmt::Debug for Core<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("options", &self.options)
            .field("classifier", &self.classifier)
            .field("hooks", &self.hooks)
            .field("clock", &self.clock)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl<T, E> Core<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(
        options: RetryOptions,
        classifier: ErrorClassifier<E>,
    ) -> Result<Self, crate::OptionsError> {
        options.validate()?;
        Ok(Self {
            options,
            classifier,
            hooks: CallbackRegistry::new(),
            clock: Arc::new(MonotonicClock::default()),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Decide what a failed attempt means: `Ok(())` to keep going, `Err` to stop with it.
    pub(crate) fn classify(&self, error: E, ctx: &RetryContext) -> Result<(), RetryError<E>> {
        if self.classifier.is_retryable(&error) {
            tracing::debug!(tried_count = ctx.tried_count, error = %error, "attempt failed; retryable");
            Ok(())
        } else {
            tracing::debug!(tried_count = ctx.tried_count, error = %error, "attempt failed; not retryable");
            Err(RetryError::Operation(error))
        }
    }

    /// Time and count bounds, checked before another attempt is scheduled.
    pub(crate) fn exceeded_bound(
        &self,
        ctx: &mut RetryContext,
        stopwatch: &Stopwatch<'_>,
    ) -> Option<RetryError<E>> {
        let elapsed = stopwatch.elapsed();
        ctx.tried_time = elapsed;

        if let Some(max_try_time) = self.options.try_time_limit() {
            if elapsed >= max_try_time {
                tracing::info!(tried_count = ctx.tried_count, ?elapsed, ?max_try_time, "giving up: max try time exceeded");
                return Some(RetryError::OverMaxTryTime { tried_time: elapsed });
            }
        }

        if ctx.tried_count >= self.options.try_count_limit() {
            tracing::info!(tried_count = ctx.tried_count, ?elapsed, "giving up: max try count reached");
            return Some(RetryError::OverMaxTryCount { tried_count: ctx.tried_count });
        }

        None
    }

    pub(crate) fn next_interval(&mut self, ctx: &RetryContext) -> Duration {
        let delay = self.options.next_interval();
        tracing::debug!(tried_count = ctx.tried_count, retry_count = ctx.retry_count, ?delay, "retrying after delay");
        delay
    }
}
