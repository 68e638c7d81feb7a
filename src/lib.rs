#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # retrier
//!
//! Retry execution engine for blocking and async Rust: run an operation, and when it fails
//! with a retryable error, wait and try again until it succeeds or a bound is reached.
//!
//! ## Features
//!
//! - **Blocking and async executors** sharing one retry loop
//! - **Intervals**: constant, or exponential with jitter and a ceiling
//! - **Bounds** on total attempts and elapsed time
//! - **Error classification** with an allow-list of retryable error kinds
//! - **Acceptance conditions** to retry successful-but-unsatisfactory results
//! - **Lifecycle hooks** before each retry, on success, on failure
//! - **Cooperative cancellation** via `tokio_util::sync::CancellationToken`
//!
//! ## Quick Start
//!
//! ```rust
//! use retrier::{AsyncRetryExecutor, ErrorClassifier, ExponentialInterval, RetryOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = RetryOptions::new()
//!         .max_try_count(3)
//!         .interval(ExponentialInterval::new(Duration::from_millis(10)));
//!
//!     let mut executor = AsyncRetryExecutor::new(
//!         || async {
//!             // Your async operation here
//!             Ok::<_, std::io::Error>(())
//!         },
//!         options,
//!         ErrorClassifier::new(),
//!     )
//!     .expect("valid options");
//!
//!     let result = executor.run().await;
//!     assert!(result.is_success());
//! }
//! ```

pub mod builder;
pub mod classify;
pub mod clock;
pub mod context;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod interval;
pub mod options;
pub mod prelude;
pub mod result;
pub mod sleeper;

// Re-exports
pub use builder::RetryBuilder;
pub use classify::{ErrorClassifier, ErrorKind};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::RetryContext;
pub use error::{BoxError, RetryError};
pub use executor::blocking::RetryExecutor;
pub use executor::suspending::{AsyncRetryExecutor, RunOptions};
pub use hooks::{Acceptance, CallbackRegistry, Hook, HookKind};
pub use interval::{
    ConstantInterval, ExponentialInterval, IntervalError, IntervalStrategy, MAX_INTERVAL,
};
pub use options::{OptionsError, RetryOptions};
pub use result::RetryResult;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use tokio_util::sync::CancellationToken;
