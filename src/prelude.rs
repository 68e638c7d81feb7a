//! Convenient re-exports for common retrier types.
pub use crate::{
    classify::{ErrorClassifier, ErrorKind},
    context::RetryContext,
    error::{BoxError, RetryError},
    executor::{
        blocking::RetryExecutor,
        suspending::{AsyncRetryExecutor, RunOptions},
    },
    interval::{ConstantInterval, ExponentialInterval, IntervalStrategy},
    options::RetryOptions,
    result::RetryResult,
    RetryBuilder,
};
