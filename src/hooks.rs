//! Lifecycle hooks and acceptance conditions.
//!
//! Every hook is stored in one canonical shape, `(result, context) -> Result<(), BoxError>`,
//! either synchronous or returning a future. The simpler user-facing shapes (without context,
//! sync vs async) are wrapped into that shape when registered, so the executors only ever see
//! [`Hook`].
//!
//! Hooks of one category run in registration order, one after another. The first hook that
//! fails stops the round; its error is wrapped according to the [`HookKind`].

use crate::context::RetryContext;
use crate::error::{BoxError, RetryError};
use crate::result::RetryResult;
use futures::future::BoxFuture;
use std::fmt;

type SyncHookFn<T, E> =
    dyn Fn(&RetryResult<T, E>, RetryContext) -> Result<(), BoxError> + Send + Sync;

type AsyncHookFn<T, E> = dyn for<'a> Fn(&'a RetryResult<T, E>, RetryContext) -> BoxFuture<'a, Result<(), BoxError>>
    + Send
    + Sync;

/// A registered hook, dispatched by shape at invocation time.
pub enum Hook<T, E> {
    Sync(Box<SyncHookFn<T, E>>),
    Suspending(Box<AsyncHookFn<T, E>>),
}

impl<T, E> fmt::Debug for Hook<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Sync(_) => f.write_str("Hook::Sync(<fn>)"),
            Hook::Suspending(_) => f.write_str("Hook::Suspending(<fn>)"),
        }
    }
}

impl<T, E> Hook<T, E> {
    /// Wrap a synchronous `(result, context)` hook.
    pub fn sync<F>(hook: F) -> Self
    where
        F: Fn(&RetryResult<T, E>, RetryContext) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Hook::Sync(Box::new(hook))
    }

    /// Wrap a `(result, context)` hook returning a future.
    pub fn suspending<F>(hook: F) -> Self
    where
        F: for<'a> Fn(&'a RetryResult<T, E>, RetryContext) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        Hook::Suspending(Box::new(hook))
    }

    async fn invoke(&self, result: &RetryResult<T, E>, ctx: RetryContext) -> Result<(), BoxError> {
        match self {
            Hook::Sync(hook) => hook(result, ctx),
            Hook::Suspending(hook) => hook(result, ctx).await,
        }
    }

    fn invoke_blocking(&self, result: &RetryResult<T, E>, ctx: RetryContext) -> Result<(), BoxError> {
        match self {
            Hook::Sync(hook) => hook(result, ctx),
            Hook::Suspending(hook) => futures::executor::block_on(hook(result, ctx)),
        }
    }
}

/// Hook category; decides how a hook failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before each retry.
    Retry,
    /// After the operation succeeded and was accepted.
    Success,
    /// After the execution ended without success.
    Failure,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::Retry => "retry",
            HookKind::Success => "success",
            HookKind::Failure => "failure",
        }
    }

    /// Wrap a hook failure into the matching terminal error.
    pub fn wrap<E>(self, error: BoxError) -> RetryError<E> {
        match self {
            HookKind::Retry => RetryError::RetryCallback(error),
            HookKind::Success => RetryError::SuccessCallback(error),
            HookKind::Failure => RetryError::FailureCallback(error),
        }
    }
}

/// Ordered retry/success/failure hooks of one executor.
pub struct CallbackRegistry<T, E> {
    retry: Vec<Hook<T, E>>,
    success: Vec<Hook<T, E>>,
    failure: Vec<Hook<T, E>>,
}

impl<T, E> Default for CallbackRegistry<T, E> {
    fn default() -> Self {
        Self { retry: Vec::new(), success: Vec::new(), failure: Vec::new() }
    }
}

impl<T, E> fmt::Debug for CallbackRegistry<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("retry", &self.retry.len())
            .field("success", &self.success.len())
            .field("failure", &self.failure.len())
            .finish()
    }
}

impl<T, E> CallbackRegistry<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook to a category.
    pub fn register(&mut self, kind: HookKind, hook: Hook<T, E>) {
        self.hooks_mut(kind).push(hook);
    }

    fn hooks(&self, kind: HookKind) -> &[Hook<T, E>] {
        match kind {
            HookKind::Retry => &self.retry,
            HookKind::Success => &self.success,
            HookKind::Failure => &self.failure,
        }
    }

    fn hooks_mut(&mut self, kind: HookKind) -> &mut Vec<Hook<T, E>> {
        match kind {
            HookKind::Retry => &mut self.retry,
            HookKind::Success => &mut self.success,
            HookKind::Failure => &mut self.failure,
        }
    }

    /// Run every hook of `kind` in order, awaiting suspending ones.
    pub async fn invoke(
        &self,
        kind: HookKind,
        result: &RetryResult<T, E>,
        ctx: RetryContext,
    ) -> Result<(), RetryError<E>> {
        for hook in self.hooks(kind) {
            if let Err(e) = hook.invoke(result, ctx).await {
                tracing::warn!(hook = kind.as_str(), tried_count = ctx.tried_count, error = %e, "hook failed");
                return Err(kind.wrap(e));
            }
        }
        Ok(())
    }

    /// Run every hook of `kind` in order on the calling thread.
    pub fn invoke_blocking(
        &self,
        kind: HookKind,
        result: &RetryResult<T, E>,
        ctx: RetryContext,
    ) -> Result<(), RetryError<E>> {
        for hook in self.hooks(kind) {
            if let Err(e) = hook.invoke_blocking(result, ctx) {
                tracing::warn!(hook = kind.as_str(), tried_count = ctx.tried_count, error = %e, "hook failed");
                return Err(kind.wrap(e));
            }
        }
        Ok(())
    }
}

type SyncConditionFn<'c, T, E> =
    dyn FnMut(&RetryResult<T, E>) -> Result<bool, BoxError> + Send + 'c;

type AsyncConditionFn<'c, T, E> = dyn for<'a> FnMut(&'a RetryResult<T, E>) -> BoxFuture<'a, Result<bool, BoxError>>
    + Send
    + 'c;

/// Caller-supplied predicate deciding whether a successful result is good enough.
///
/// `Ok(true)` accepts the result, `Ok(false)` asks for another attempt, and `Err` ends the
/// execution with [`RetryError::AssertCallback`].
pub enum Acceptance<'c, T, E> {
    Sync(Box<SyncConditionFn<'c, T, E>>),
    Suspending(Box<AsyncConditionFn<'c, T, E>>),
}

impl<'c, T, E> Acceptance<'c, T, E> {
    pub fn sync<F>(condition: F) -> Self
    where
        F: FnMut(&RetryResult<T, E>) -> Result<bool, BoxError> + Send + 'c,
    {
        Acceptance::Sync(Box::new(condition))
    }

    pub fn suspending<F>(condition: F) -> Self
    where
        F: for<'a> FnMut(&'a RetryResult<T, E>) -> BoxFuture<'a, Result<bool, BoxError>> + Send + 'c,
    {
        Acceptance::Suspending(Box::new(condition))
    }

    pub(crate) async fn evaluate(&mut self, result: &RetryResult<T, E>) -> Result<bool, BoxError> {
        match self {
            Acceptance::Sync(condition) => condition(result),
            Acceptance::Suspending(condition) => condition(result).await,
        }
    }

    pub(crate) fn evaluate_blocking(&mut self, result: &RetryResult<T, E>) -> Result<bool, BoxError> {
        match self {
            Acceptance::Sync(condition) => condition(result),
            Acceptance::Suspending(condition) => futures::executor::block_on(condition(result)),
        }
    }
}

impl<T, E> fmt::Debug for Acceptance<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acceptance::Sync(_) => f.write_str("Acceptance::Sync(<fn>)"),
            Acceptance::Suspending(_) => f.write_str("Acceptance::Suspending(<fn>)"),
        }
    }
}
