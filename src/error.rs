//! Error types produced by a retry execution
use std::fmt;
use std::time::Duration;

/// Boxed error returned by hooks and acceptance conditions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal error of a retry execution.
///
/// Retryable operation failures never show up here; they only drive the loop. Everything else
/// ends the execution and becomes the `error` of the returned [`RetryResult`](crate::RetryResult).
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error the classifier refused to retry.
    Operation(E),
    /// The elapsed-time bound was reached.
    OverMaxTryTime { tried_time: Duration },
    /// The attempt-count bound was reached.
    OverMaxTryCount { tried_count: usize },
    /// The cancellation signal fired (async executor only).
    Cancelled,
    /// A retry hook failed.
    RetryCallback(BoxError),
    /// A success hook failed after the operation succeeded.
    SuccessCallback(BoxError),
    /// A failure hook failed; replaces whatever terminal error was being reported.
    FailureCallback(BoxError),
    /// Evaluating the acceptance condition failed.
    AssertCallback(BoxError),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{}", e),
            Self::OverMaxTryTime { tried_time } => {
                write!(f, "retry gave up after {:?} (max try time exceeded)", tried_time)
            }
            Self::OverMaxTryCount { tried_count } => {
                write!(f, "retry gave up after {} attempts (max try count exceeded)", tried_count)
            }
            Self::Cancelled => write!(f, "retry cancelled"),
            Self::RetryCallback(e) => write!(f, "on-retry hook failed: {}", e),
            Self::SuccessCallback(e) => write!(f, "on-success hook failed: {}", e),
            Self::FailureCallback(e) => write!(f, "on-failure hook failed: {}", e),
            Self::AssertCallback(e) => write!(f, "acceptance condition failed: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => Some(e),
            Self::RetryCallback(e)
            | Self::SuccessCallback(e)
            | Self::FailureCallback(e)
            | Self::AssertCallback(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Check if the operation's own error ended the execution.
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }
    /// Check if the elapsed-time bound ended the execution.
    pub fn is_over_max_try_time(&self) -> bool {
        matches!(self, Self::OverMaxTryTime { .. })
    }
    /// Check if the attempt-count bound ended the execution.
    pub fn is_over_max_try_count(&self) -> bool {
        matches!(self, Self::OverMaxTryCount { .. })
    }
    /// Check if the execution was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
    /// Check if a hook or the acceptance condition failed.
    pub fn is_callback(&self) -> bool {
        self.callback_error().is_some()
    }
    /// Attempt count carried by `OverMaxTryCount`.
    pub fn tried_count(&self) -> Option<usize> {
        match self {
            Self::OverMaxTryCount { tried_count } => Some(*tried_count),
            _ => None,
        }
    }
    /// Elapsed time carried by `OverMaxTryTime`.
    pub fn tried_time(&self) -> Option<Duration> {
        match self {
            Self::OverMaxTryTime { tried_time } => Some(*tried_time),
            _ => None,
        }
    }
    /// Borrow the operation error if present.
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
    /// Take the operation error if present.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the error raised inside a hook or acceptance condition.
    pub fn callback_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::RetryCallback(e)
            | Self::SuccessCallback(e)
            | Self::FailureCallback(e)
            | Self::AssertCallback(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
