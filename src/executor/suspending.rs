//! Async retry executor with cooperative cancellation.

use super::Core;
use crate::classify::ErrorClassifier;
use crate::clock::{Clock, Stopwatch};
use crate::context::RetryContext;
use crate::error::{BoxError, RetryError};
use crate::hooks::{Acceptance, Hook, HookKind};
use crate::options::{OptionsError, RetryOptions};
use crate::result::RetryResult;
use crate::sleeper::Sleeper;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub(crate) type AsyncOperation<T, E> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, E>> + Send>;

/// Per-run settings of an [`AsyncRetryExecutor`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Token observed between attempts and during delays.
    pub cancellation: Option<CancellationToken>,
    /// Scheduling hint kept for parity with callers that carry one. It is recorded on the
    /// execution span and has no other effect.
    pub continue_on_captured_context: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn continue_on_captured_context(mut self, value: bool) -> Self {
        self.continue_on_captured_context = value;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Runs an async operation until it succeeds, a bound is hit, or the run is cancelled.
///
/// Cancellation is cooperative: it is observed before and during the delay between attempts
/// and when deciding whether to continue, never by aborting a running attempt.
pub struct AsyncRetryExecutor<T, E> {
    operation: AsyncOperation<T, E>,
    core: Core<T, E>,
}

impl<T, E> fmt::Debug for AsyncRetryExecutor<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRetryExecutor").field("core", &self.core).finish_non_exhaustive()
    }
}

impl<T, E> AsyncRetryExecutor<T, E>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create an executor; fails when `options` are invalid.
    pub fn new<Op, Fut>(
        mut operation: Op,
        options: RetryOptions,
        classifier: ErrorClassifier<E>,
    ) -> Result<Self, OptionsError>
    where
        Op: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Ok(Self {
            operation: Box::new(move || operation().boxed()),
            core: Core::new(options, classifier)?,
        })
    }

    pub(crate) fn from_parts(operation: AsyncOperation<T, E>, core: Core<T, E>) -> Self {
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

    pub fn on_retry_async<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a RetryResult<T, E>) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(HookKind::Retry, Hook::suspending(move |result, _ctx| hook(result)))
    }

    pub fn on_retry_async_with_context<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a RetryResult<T, E>, RetryContext) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(HookKind::Retry, Hook::suspending(hook))
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

    pub fn on_success_async<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a RetryResult<T, E>) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(HookKind::Success, Hook::suspending(move |result, _ctx| hook(result)))
    }

    pub fn on_success_async_with_context<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a RetryResult<T, E>, RetryContext) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(HookKind::Success, Hook::suspending(hook))
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

    pub fn on_failure_async<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a RetryResult<T, E>) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(HookKind::Failure, Hook::suspending(move |result, _ctx| hook(result)))
    }

    pub fn on_failure_async_with_context<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a RetryResult<T, E>, RetryContext) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(HookKind::Failure, Hook::suspending(hook))
    }

    /// Register a hook in its canonical form.
    pub fn register_hook(&mut self, kind: HookKind, hook: Hook<T, E>) -> &mut Self {
        self.core.hooks.register(kind, hook);
        self
    }

    /// Run the operation with retries and default [`RunOptions`].
    pub async fn run(&mut self) -> RetryResult<T, E> {
        self.run_with(RunOptions::default()).await
    }

    /// Run the operation with retries.
    pub async fn run_with(&mut self, run: RunOptions) -> RetryResult<T, E> {
        self.execute(None, run).await
    }

    /// Run with retries, also retrying successes that `condition` rejects.
    pub async fn run_until<C>(&mut self, condition: C, run: RunOptions) -> RetryResult<T, E>
    where
        C: FnMut(&RetryResult<T, E>) -> Result<bool, BoxError> + Send,
    {
        self.execute(Some(Acceptance::sync(condition)), run).await
    }

    /// Like [`run_until`](Self::run_until) with an async condition.
    pub async fn run_until_async<C>(&mut self, condition: C, run: RunOptions) -> RetryResult<T, E>
    where
        C: for<'a> FnMut(&'a RetryResult<T, E>) -> BoxFuture<'a, Result<bool, BoxError>> + Send,
    {
        self.execute(Some(Acceptance::suspending(condition)), run).await
    }

    async fn execute(
        &mut self,
        acceptance: Option<Acceptance<'_, T, E>>,
        run: RunOptions,
    ) -> RetryResult<T, E> {
        let span = tracing::debug_span!(
            "retry",
            mode = "async",
            continue_on_captured_context = run.continue_on_captured_context
        );
        self.execute_inner(acceptance, run).instrument(span).await
    }

    async fn execute_inner(
        &mut self,
        mut acceptance: Option<Acceptance<'_, T, E>>,
        run: RunOptions,
    ) -> RetryResult<T, E> {
        let core = &mut self.core;
        let operation = &mut self.operation;

        let clock = Arc::clone(&core.clock);
        let stopwatch = Stopwatch::start(clock.as_ref());
        let mut ctx = RetryContext::default();
        let mut result = RetryResult::new();

        loop {
            ctx.begin_attempt(stopwatch.elapsed());

            if ctx.is_retry() {
                if let Err(e) = core.hooks.invoke(HookKind::Retry, &result, ctx).await {
                    result.fail(e);
                    break;
                }
                let delay = core.next_interval(&ctx);
                if !wait(core.sleeper.as_ref(), delay, &run).await {
                    tracing::info!(tried_count = ctx.tried_count, "cancelled during retry delay");
                    result.fail(RetryError::Cancelled);
                    break;
                }
            }

            match operation().await {
                Ok(value) => result.value = Some(value),
                Err(e) => match core.classify(e, &ctx) {
                    Ok(()) => {
                        if let Some(stop) = should_stop(core, &mut ctx, &stopwatch, &run) {
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
                match condition.evaluate(&result).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(tried_count = ctx.tried_count, "result not accepted");
                        if let Some(stop) = should_stop(core, &mut ctx, &stopwatch, &run) {
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

            match core.hooks.invoke(HookKind::Success, &result, ctx).await {
                Ok(()) => tracing::debug!(tried_count = ctx.tried_count, "operation succeeded"),
                Err(e) => result.fail(e),
            }
            return result;
        }

        if let Err(e) = core.hooks.invoke(HookKind::Failure, &result, ctx).await {
            result.fail(e);
        }
        result
    }
}

/// Bounds first, cancellation last.
fn should_stop<T, E>(
    core: &Core<T, E>,
    ctx: &mut RetryContext,
    stopwatch: &Stopwatch<'_>,
    run: &RunOptions,
) -> Option<RetryError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let Some(stop) = core.exceeded_bound(ctx, stopwatch) {
        return Some(stop);
    }
    if run.is_cancelled() {
        tracing::info!(tried_count = ctx.tried_count, "cancelled before next attempt");
        return Some(RetryError::Cancelled);
    }
    None
}

/// Wait out `delay`; `false` when the run was cancelled first.
async fn wait(sleeper: &dyn Sleeper, delay: Duration, run: &RunOptions) -> bool {
    let Some(token) = run.cancellation.as_ref() else {
        if !delay.is_zero() {
            sleeper.sleep(delay).await;
        }
        return true;
    };

    if token.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = sleeper.sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::interval::ConstantInterval;
    use crate::sleeper::{InstantSleeper, TrackingSleeper};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn options(count: usize) -> RetryOptions {
        RetryOptions::new().max_try_count(count).interval(ConstantInterval::new(Duration::from_millis(10)))
    }

    fn always_failing(calls: Arc<AtomicUsize>) -> AsyncRetryExecutor<(), io::Error> {
        AsyncRetryExecutor::new(
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")) }
            },
            options(3),
            ErrorClassifier::new(),
        )
        .unwrap()
        .with_sleeper(InstantSleeper)
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sleeper = TrackingSleeper::new();
        let mut executor = AsyncRetryExecutor::new(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
                    } else {
                        Ok(n)
                    }
                }
            },
            options(5),
            ErrorClassifier::new(),
        )
        .unwrap()
        .with_sleeper(sleeper.clone());

        assert_eq!(executor.run().await.into_result().unwrap(), 3);
        assert_eq!(sleeper.all(), vec![Duration::from_millis(10); 2]);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let classifier = ErrorClassifier::new()
            .with_kind(ErrorKind::matching("timeout", |e: &io::Error| e.kind() == io::ErrorKind::TimedOut));
        let mut executor = AsyncRetryExecutor::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(io::Error::new(io::ErrorKind::PermissionDenied, "denied")) }
            },
            options(5),
            classifier,
        )
        .unwrap();

        let err = executor.run().await.into_result().unwrap_err();
        assert_eq!(err.as_operation().map(io::Error::kind), Some(io::ErrorKind::PermissionDenied));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let retries = Arc::new(AtomicUsize::new(0));
        let tried = Arc::new(AtomicUsize::new(0));
        let mut executor = always_failing(calls.clone());
        let counter = retries.clone();
        executor.on_retry(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let seen = tried.clone();
        executor.on_failure_with_context(move |_, ctx| {
            seen.store(ctx.tried_count, Ordering::SeqCst);
            Ok(())
        });

        let token = CancellationToken::new();
        token.cancel();
        let result = executor.run_with(RunOptions::new().with_cancellation(token)).await;

        assert!(result.error().unwrap().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tried.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_from_retry_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let retries = Arc::new(AtomicUsize::new(0));
        let mut executor = always_failing(calls.clone());
        let token = CancellationToken::new();
        let hook_token = token.clone();
        let counter = retries.clone();
        executor.on_retry(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            hook_token.cancel();
            Ok(())
        });

        let result = executor.run_with(RunOptions::new().with_cancellation(token)).await;

        assert!(result.error().unwrap().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut executor = AsyncRetryExecutor::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(io::Error::new(io::ErrorKind::TimedOut, "slow")) }
            },
            RetryOptions::new().max_try_count(3).interval(ConstantInterval::new(Duration::from_secs(60))),
            ErrorClassifier::new(),
        )
        .unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let result = executor.run_with(RunOptions::new().with_cancellation(token)).await;

        assert!(result.error().unwrap().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn count_bound_wins_over_cancellation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut executor = AsyncRetryExecutor::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(io::Error::new(io::ErrorKind::TimedOut, "slow")) }
            },
            options(1),
            ErrorClassifier::new(),
        )
        .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = executor
            .run_with(RunOptions::new().with_cancellation(token))
            .await
            .into_result()
            .unwrap_err();
        assert!(err.is_over_max_try_count());
    }

    #[tokio::test]
    async fn async_hooks_run_in_order_with_sync_ones() {
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut executor = always_failing(Arc::new(AtomicUsize::new(0)));

        let first = log.clone();
        executor.on_retry_async(move |_| {
            let log = first.clone();
            async move {
                tokio::task::yield_now().await;
                log.lock().unwrap().push("async retry".to_string());
                Ok(())
            }
            .boxed()
        });
        let second = log.clone();
        executor.on_retry_with_context(move |_, ctx| {
            second.lock().unwrap().push(format!("sync retry {}", ctx.retry_count));
            Ok(())
        });
        let third = log.clone();
        executor.on_failure_async_with_context(move |result, ctx| {
            let log = third.clone();
            let over = result.error().is_some_and(RetryError::is_over_max_try_count);
            async move {
                log.lock().unwrap().push(format!("failure {} {}", ctx.tried_count, over));
                Ok(())
            }
            .boxed()
        });

        executor.run().await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["async retry", "sync retry 1", "async retry", "sync retry 2", "failure 3 true"]
        );
    }

    #[tokio::test]
    async fn retry_hook_failure_goes_to_failure_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut executor = always_failing(calls.clone());
        executor.on_retry(|_| Err("stop".into()));
        let saw_retry_error = Arc::new(AtomicUsize::new(0));
        let flag = saw_retry_error.clone();
        executor.on_failure(move |result| {
            if matches!(result.error(), Some(RetryError::RetryCallback(_))) {
                flag.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        let result = executor.run().await;
        assert!(matches!(result.error(), Some(RetryError::RetryCallback(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(saw_retry_error.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_hook_error_replaces_terminal_error() {
        let mut executor = always_failing(Arc::new(AtomicUsize::new(0)));
        executor.on_failure_async(|_| async { Err::<(), BoxError>("report failed".into()) }.boxed());

        let err = executor.run().await.into_result().unwrap_err();
        assert!(matches!(err, RetryError::FailureCallback(_)));
        assert_eq!(err.callback_error().unwrap().to_string(), "report failed");
    }

    #[tokio::test]
    async fn async_acceptance_drives_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let successes = Arc::new(AtomicUsize::new(0));
        let mut executor = AsyncRetryExecutor::new(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, io::Error>(n) }
            },
            options(5),
            ErrorClassifier::new(),
        )
        .unwrap()
        .with_sleeper(InstantSleeper);
        let seen = successes.clone();
        executor.on_success_async_with_context(move |result, ctx| {
            assert_eq!(result.value(), Some(&ctx.tried_count));
            seen.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        });

        let result = executor
            .run_until_async(
                |r| {
                    let done = r.value().is_some_and(|v| *v == 3);
                    async move { Ok(done) }.boxed()
                },
                RunOptions::new().continue_on_captured_context(true),
            )
            .await;

        assert_eq!(result.into_result().unwrap(), 3);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_to_the_end_keeps_last_value() {
        let mut executor = AsyncRetryExecutor::new(
            || async { Ok::<_, io::Error>(7) },
            options(2),
            ErrorClassifier::new(),
        )
        .unwrap()
        .with_sleeper(InstantSleeper);

        let result = executor.run_until(|_| Ok(false), RunOptions::default()).await;
        assert_eq!(result.value(), Some(&7));
        assert_eq!(result.error().and_then(RetryError::tried_count), Some(2));
    }

    #[tokio::test]
    async fn executor_is_reusable_across_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut executor = always_failing(calls.clone());

        executor.run().await;
        executor.run().await;
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn run_future_is_send() {
        fn assert_send<F: Send>(_: F) {}
        let mut executor = always_failing(Arc::new(AtomicUsize::new(0)));
        assert_send(executor.run());
    }
}
