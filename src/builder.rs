//! Fluent assembly of options, retryable kinds and runtime pieces.
//!
//! ```rust
//! use retrier::{ExponentialInterval, RetryBuilder};
//! use std::io;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut executor = RetryBuilder::<io::Error>::new()
//!     .retry_on::<io::Error>()
//!     .configure(|options| {
//!         options
//!             .max_try_count(4)
//!             .interval(ExponentialInterval::new(Duration::from_millis(1)))
//!     })
//!     .build_async(|| async { Ok::<_, io::Error>("ready") })
//!     .unwrap();
//!
//! assert_eq!(executor.run().await.into_result().unwrap(), "ready");
//! # }
//! ```

use crate::classify::{ErrorClassifier, ErrorKind};
use crate::clock::Clock;
use crate::executor::blocking::RetryExecutor;
use crate::executor::suspending::AsyncRetryExecutor;
use crate::executor::Core;
use crate::options::{OptionsError, RetryOptions};
use crate::sleeper::Sleeper;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Builder for [`RetryExecutor`] and [`AsyncRetryExecutor`].
pub struct RetryBuilder<E> {
    options: RetryOptions,
    classifier: ErrorClassifier<E>,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl<E> fmt::Debug for RetryBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryBuilder")
            .field("options", &self.options)
            .field("classifier", &self.classifier)
            .field("clock", &self.clock)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl<E> Default for RetryBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Default options, retrying every recoverable error.
    pub fn new() -> Self {
        Self {
            options: RetryOptions::default(),
            classifier: ErrorClassifier::new(),
            clock: None,
            sleeper: None,
        }
    }

    /// Retry only errors whose source chain contains a `K` (plus any other registered kinds).
    pub fn retry_on<K>(self) -> Self
    where
        K: std::error::Error + 'static,
    {
        self.retry_on_kind(ErrorKind::of::<K>())
    }

    pub fn retry_on_kind(mut self, kind: ErrorKind<E>) -> Self {
        self.classifier = self.classifier.with_kind(kind);
        self
    }

    /// Forget registered kinds and retry every recoverable error.
    pub fn retry_all(mut self) -> Self {
        self.classifier.clear();
        self
    }

    /// Edit the options in place.
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(RetryOptions) -> RetryOptions,
    {
        self.options = configure(self.options);
        self
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Build a blocking executor around `operation`.
    pub fn build<T, Op>(self, operation: Op) -> Result<RetryExecutor<T, E>, OptionsError>
    where
        T: Send + Sync + 'static,
        Op: FnMut() -> Result<T, E> + Send + 'static,
    {
        let core = self.into_core()?;
        Ok(RetryExecutor::from_parts(Box::new(operation), core))
    }

    /// Build an async executor around `operation`.
    pub fn build_async<T, Op, Fut>(
        self,
        mut operation: Op,
    ) -> Result<AsyncRetryExecutor<T, E>, OptionsError>
    where
        T: Send + Sync + 'static,
        Op: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let core = self.into_core()?;
        Ok(AsyncRetryExecutor::from_parts(Box::new(move || operation().boxed()), core))
    }

    fn into_core<T>(self) -> Result<Core<T, E>, OptionsError> {
        let mut core = Core::new(self.options, self.classifier)?;
        if let Some(clock) = self.clock {
            core.clock = clock;
        }
        if let Some(sleeper) = self.sleeper {
            core.sleeper = sleeper;
        }
        Ok(core)
    }
}
