//! Outcome of a retry execution.

use crate::error::RetryError;

/// Success payload or terminal error of one execution.
///
/// The executor fills it in while the loop runs and hands it to hooks by reference. Once
/// returned to the caller it is no longer touched. `value` may be set even on failure when an
/// acceptance condition rejected the last successful attempt.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub(crate) value: Option<T>,
    pub(crate) error: Option<RetryError<E>>,
}

impl<T, E> RetryResult<T, E> {
    pub(crate) fn new() -> Self {
        Self { value: None, error: None }
    }

    /// True when no terminal error was recorded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Latest value produced by the operation, if any attempt succeeded.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Terminal error, if the execution failed.
    pub fn error(&self) -> Option<&RetryError<E>> {
        self.error.as_ref()
    }

    /// Split into the latest value and the terminal error.
    pub fn into_parts(self) -> (Option<T>, Option<RetryError<E>>) {
        (self.value, self.error)
    }

    /// Convert into a standard `Result`.
    ///
    /// A result returned by an executor always holds either a value or an error.
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        match (self.value, self.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => unreachable!("retry result returned without value or error"),
        }
    }

    pub(crate) fn fail(&mut self, error: RetryError<E>) {
        self.error = Some(error);
    }
}
