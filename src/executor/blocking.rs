//! Blocking retry executor.

use super::suspending::AsyncRetryExecutor;
use super::Core;
use crate::classify::ErrorClassifier;
use crate::clock::{Clock, Stopwatch};
use crate::context::RetryContext;
use crate::error::{BoxError, RetryError};
use crate::hooks::{Acceptance, Hook, HookKind};
use crate::options::{OptionsError, RetryOptions};
use crate::result::RetryResult;
use crate::sleeper::Sleeper;
use futures::FutureExt;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type BlockingOperation<T, E> = Box<dyn FnMut() -> Result<T, E> + Send>;

/// Runs a blocking operation until it succeeds or a bound is hit.
///
/// Delays block the calling thread. Hooks registered here are synchronous; use
/// [`into_async`](Self::into_async) for suspending hooks and cancellation.
///
/// ```
/// use retrier::{ErrorClassifier, RetryExecutor, RetryOptions};
/// use std::time::Duration;
///
/// let mut calls = 0;
/// let mut executor = RetryExecutor::new(
///     move || {
///         calls += 1;
///         if calls < 3 {
///             Err(std::io::Error::new(std::io::ErrorKind::Other, "not yet"))
///         } else {
///             Ok(calls)
///         }
///     },
///     RetryOptions::new().max_try_count(5).interval(retrier::ConstantInterval::new(Duration::ZERO)),
///     ErrorClassifier::new(),
/// )
/// .unwrap();
///
/// assert_eq!(executor.run().into_result().unwrap(), 3);
/// ```
pub struct RetryExecutor<T, E> {
    operation: BlockingOperation<T, E>,
    core: Core<T, E>,
}

impl<T, E> fmt::Debug for RetryExecutor<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor").field("core", &self.core).finish_non_exhaustive()
    }
}

impl<T, E> RetryExecutor<T, E>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create an executor; fails when `options` are invalid.
    pub fn new<Op>(
        operation: Op,
        options: RetryOptions,
        classifier: ErrorClassifier<E>,
    ) -> Result<Self, OptionsError>
    where
        Op: FnMut() -> Result<T, E> + Send + 'static,
    {
        Ok(Self { operation: Box::new(operation), core: Core::new(options, classifier)? })
    }

    pub(crate) fn from_parts(operation: BlockingOperation<T, E>, core: Core<T, E>) -> Self {
        Self { operation, core }
    }

    /// Replace the clock used to measure elapsed time.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.core.clock = Arc::new(clock);
        self
    }

    /// Replace the sleeper used between attempts.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.core.sleeper = Arc::new(sleeper);
        self
    }

    pub fn on_retry<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RetryResult<T, E>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_hook(HookKind::Retry, Hook::sync(move |result, _ctx| hook(result)))
    }

    pub fn on_retry_with_context<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RetryResult<T, E>, RetryContext) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_hook(HookKind::Retry, Hook::sync(hook))
    }

    pub fn on_success<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RetryResult<T, E>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_hook(HookKind::Success, Hook::sync(move |result, _ctx| hook(result)))
    }

    pub fn on_success_with_context<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RetryResult<T, E>, RetryContext) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_hook(HookKind::Success, Hook::sync(hook))
    }

    pub fn on_failure<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RetryResult<T, E>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_hook(HookKind::Failure, Hook::sync(move |result, _ctx| hook(result)))
    }

    pub fn on_failure_with_context<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RetryResult<T, E>, RetryContext) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_hook(HookKind::Failure, Hook::sync(hook))
    }

    /// Register a hook in its canonical form.
    ///
    /// [`Hook::Suspending`] hooks are driven to completion on the calling thread.
    pub fn register_hook(&mut self, kind: HookKind, hook: Hook<T, E>) -> &mut Self {
        self.core.hooks.register(kind, hook);
        self
    }

    /// Run the operation with retries.
    pub fn run(&mut self) -> RetryResult<T, E> {
        self.execute(None)
    }

    /// Run the operation with retries, also retrying successes that `condition` rejects.
    pub fn run_until<C>(&mut self, condition: C) -> RetryResult<T, E>
    where
        C: FnMut(&RetryResult<T, E>) -> Result<bool, BoxError> + Send,
    {
        self.run_accepting(Acceptance::sync(condition))
    }

    /// Like [`run_until`](Self::run_until) with any [`Acceptance`]; suspending conditions are
    /// driven to completion on the calling thread.
    pub fn run_accepting(&mut self, acceptance: Acceptance<'_, T, E>) -> RetryResult<T, E> {
        self.execute(Some(acceptance))
    }

    /// Turn this executor into an [`AsyncRetryExecutor`] over the same operation.
    ///
    /// Options, classifier, hooks, clock and sleeper carry over. Each attempt runs on tokio's
    /// blocking pool, so the returned executor must be driven inside a tokio runtime. A panic in
    /// the operation resumes on the task awaiting the run.
    pub fn into_async(self) -> AsyncRetryExecutor<T, E> {
        let operation = Arc::new(Mutex::new(self.operation));
        AsyncRetryExecutor::from_parts(
            Box::new(move || {
                let operation = Arc::clone(&operation);
                async move {
                    let attempt = tokio::task::spawn_blocking(move || {
                        let mut guard = operation.lock().unwrap_or_else(PoisonError::into_inner);
                        let operation = &mut *guard;
                        operation()
                    });
                    match attempt.await {
                        Ok(outcome) => outcome,
                        Err(e) => match e.try_into_panic() {
                            Ok(payload) => std::panic::resume_unwind(payload),
                            // only reachable while the runtime shuts down
                            Err(e) => panic!("blocking attempt did not complete: {e}"),
                        },
                    }
                }
                .boxed()
            }),
            self.core,
        )
    }

    fn execute(&mut self, mut acceptance: Option<Acceptance<'_, T, E>>) -> RetryResult<T, E> {
        let _span = tracing::debug_span!("retry", mode = "blocking").entered();
        let core = &mut self.core;
        let operation = &mut self.operation;

        let clock = Arc::clone(&core.clock);
        let stopwatch = Stopwatch::start(clock.as_ref());
        let mut ctx = RetryContext::default();
        let mut result = RetryResult::new();

        loop {
            ctx.begin_attempt(stopwatch.elapsed());

            if ctx.is_retry() {
                if let Err(e) = core.hooks.invoke_blocking(HookKind::Retry, &result, ctx) {
                    result.fail(e);
                    break;
                }
                let delay = core.next_interval(&ctx);
                if !delay.is_zero() {
                    core.sleeper.sleep_blocking(delay);
                }
            }

            match operation() {
                Ok(value) => result.value = Some(value),
                Err(e) => match core.classify(e, &ctx) {
                    Ok(()) => {
                        if let Some(stop) = core.exceeded_bound(&mut ctx, &stopwatch) {
                            result.fail(stop);
                            break;
                        }
                        continue;
                    }
                    Err(stop) => {
                        result.fail(stop);
                        break;
                    }
                },
            }

            if let Some(condition) = acceptance.as_mut() {
                match condition.evaluate_blocking(&result) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(tried_count = ctx.tried_count, "result not accepted");
                        if let Some(stop) = core.exceeded_bound(&mut ctx, &stopwatch) {
                            result.fail(stop);
                            break;
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(tried_count = ctx.tried_count, error = %e, "acceptance condition failed");
                        result.fail(RetryError::AssertCallback(e));
                        break;
                    }
                }
            }

            match core.hooks.invoke_blocking(HookKind::Success, &result, ctx) {
                Ok(()) => tracing::debug!(tried_count = ctx.tried_count, "operation succeeded"),
                Err(e) => result.fail(e),
            }
            return result;
        }

        if let Err(e) = core.hooks.invoke_blocking(HookKind::Failure, &result, ctx) {
            result.fail(e);
        }
        result
    }
}
