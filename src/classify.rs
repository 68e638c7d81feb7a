//! Deciding whether an operation failure may be retried.
//!
//! Rules, in order:
//! - allocation failures anywhere in the error's source chain are never retried;
//! - with a non-empty allow-list, an error that matches none of the configured kinds stops the
//!   loop;
//! - with an empty allow-list every other error is retried.
//!
//! Only failures of the operation itself are classified. Hook and acceptance-condition failures
//! always end the execution.
//!
//! Example
//! ```rust
//! use retrier::{ErrorClassifier, ErrorKind};
//! use std::io;
//!
//! let classifier = ErrorClassifier::<io::Error>::new()
//!     .with_kind(ErrorKind::matching("timed out", |e: &io::Error| {
//!         e.kind() == io::ErrorKind::TimedOut
//!     }));
//!
//! assert!(classifier.is_retryable(&io::Error::from(io::ErrorKind::TimedOut)));
//! assert!(!classifier.is_retryable(&io::Error::from(io::ErrorKind::NotFound)));
//! ```

use std::alloc::LayoutError;
use std::collections::TryReserveError;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// A named class of errors the caller wants retried.
pub struct ErrorKind<E> {
    name: String,
    matcher: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> Clone for ErrorKind<E> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), matcher: self.matcher.clone() }
    }
}

impl<E> fmt::Debug for ErrorKind<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorKind").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<E> ErrorKind<E>
where
    E: Error + 'static,
{
    /// Matches when the error, or any error in its `source()` chain, is a `K`.
    pub fn of<K>() -> Self
    where
        K: Error + 'static,
    {
        Self {
            name: std::any::type_name::<K>().to_string(),
            matcher: Arc::new(|e: &E| chain(e).any(|cause| cause.is::<K>())),
        }
    }

    /// Custom kind decided by a predicate.
    pub fn matching<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self { name: name.into(), matcher: Arc::new(predicate) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, error: &E) -> bool {
        (self.matcher)(error)
    }
}

/// Retry decision for operation failures, driven by an allow-list of [`ErrorKind`]s.
pub struct ErrorClassifier<E> {
    kinds: Vec<ErrorKind<E>>,
}

impl<E> Clone for ErrorClassifier<E> {
    fn clone(&self) -> Self {
        Self { kinds: self.kinds.clone() }
    }
}

impl<E> fmt::Debug for ErrorClassifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier").field("kinds", &self.kinds).finish()
    }
}

impl<E> Default for ErrorClassifier<E>
where
    E: Error + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ErrorClassifier<E>
where
    E: Error + 'static,
{
    /// Classifier with an empty allow-list: every recoverable error is retried.
    pub fn new() -> Self {
        Self { kinds: Vec::new() }
    }

    /// Classifier retrying only the given kinds.
    pub fn with_kinds(kinds: impl IntoIterator<Item = ErrorKind<E>>) -> Self {
        kinds.into_iter().fold(Self::new(), Self::with_kind)
    }

    /// Add a kind to the allow-list. Kinds sharing a name are registered once.
    pub fn with_kind(mut self, kind: ErrorKind<E>) -> Self {
        if !self.kinds.iter().any(|k| k.name == kind.name) {
            self.kinds.push(kind);
        }
        self
    }

    /// Drop the allow-list and go back to retrying every recoverable error.
    pub fn clear(&mut self) {
        self.kinds.clear();
    }

    pub fn kinds(&self) -> &[ErrorKind<E>] {
        &self.kinds
    }

    /// Decide whether a failed attempt may be retried.
    pub fn is_retryable(&self, error: &E) -> bool {
        if is_unrecoverable(error) {
            return false;
        }

        if !self.kinds.is_empty() && self.kinds.iter().all(|kind| !kind.matches(error)) {
            return false;
        }

        true
    }
}

/// Allocation failures signal a host condition another attempt will not fix.
pub fn is_unrecoverable<E>(error: &E) -> bool
where
    E: Error + 'static,
{
    chain(error).any(|cause| {
        cause.is::<TryReserveError>()
            || cause.is::<LayoutError>()
            || cause
                .downcast_ref::<io::Error>()
                .is_some_and(|e| e.kind() == io::ErrorKind::OutOfMemory)
    })
}

fn chain<'a, E>(error: &'a E) -> impl Iterator<Item = &'a (dyn Error + 'static)>
where
    E: Error + 'static,
{
    let first: &'a (dyn Error + 'static) = error;
    std::iter::successors(Some(first), |e| (*e).source())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("timeout")]
    struct Timeout;

    #[derive(Debug, thiserror::Error)]
    #[error("refused")]
    struct Refused;

    #[derive(Debug, thiserror::Error)]
    enum AppError {
        #[error("request timed out")]
        Timeout(#[source] Timeout),
        #[error("connection refused")]
        Refused(#[source] Refused),
        #[error("allocation failed")]
        Alloc(#[source] TryReserveError),
        #[error("plain")]
        Plain,
    }

    fn alloc_error() -> TryReserveError {
        Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err()
    }

    #[test]
    fn empty_allow_list_retries_everything_recoverable() {
        let classifier = ErrorClassifier::<AppError>::new();
        assert!(classifier.is_retryable(&AppError::Plain));
        assert!(classifier.is_retryable(&AppError::Timeout(Timeout)));
    }

    #[test]
    fn allocation_failures_are_never_retried() {
        let classifier = ErrorClassifier::<AppError>::new();
        assert!(!classifier.is_retryable(&AppError::Alloc(alloc_error())));

        let io_classifier = ErrorClassifier::<io::Error>::new();
        assert!(!io_classifier.is_retryable(&io::Error::from(io::ErrorKind::OutOfMemory)));
        assert!(io_classifier.is_retryable(&io::Error::from(io::ErrorKind::TimedOut)));
    }

    #[test]
    fn allocation_failure_wins_over_allow_list() {
        let classifier =
            ErrorClassifier::<AppError>::new().with_kind(ErrorKind::matching("any", |_| true));
        assert!(!classifier.is_retryable(&AppError::Alloc(alloc_error())));
    }

    #[test]
    fn allow_list_matches_source_chain() {
        let classifier = ErrorClassifier::<AppError>::new().with_kind(ErrorKind::of::<Timeout>());
        assert!(classifier.is_retryable(&AppError::Timeout(Timeout)));
        assert!(!classifier.is_retryable(&AppError::Refused(Refused)));
        assert!(!classifier.is_retryable(&AppError::Plain));
    }

    #[test]
    fn any_matching_kind_is_enough() {
        let classifier = ErrorClassifier::with_kinds([
            ErrorKind::<AppError>::of::<Timeout>(),
            ErrorKind::of::<Refused>(),
        ]);
        assert!(classifier.is_retryable(&AppError::Timeout(Timeout)));
        assert!(classifier.is_retryable(&AppError::Refused(Refused)));
        assert!(!classifier.is_retryable(&AppError::Plain));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("request failed")]
    struct Wrapped(#[source] AppError);

    #[test]
    fn source_chain_is_walked_past_the_first_hop() {
        let wrapped = Wrapped(AppError::Timeout(Timeout));
        assert_eq!(chain(&wrapped).count(), 3);

        let classifier = ErrorClassifier::<Wrapped>::new().with_kind(ErrorKind::of::<Timeout>());
        assert!(classifier.is_retryable(&wrapped));
        assert!(!classifier.is_retryable(&Wrapped(AppError::Plain)));
        assert!(is_unrecoverable(&Wrapped(AppError::Alloc(alloc_error()))));
    }

    #[test]
    fn kind_of_matches_the_error_itself() {
        let kind = ErrorKind::<Timeout>::of::<Timeout>();
        assert!(kind.matches(&Timeout));
    }

    #[test]
    fn duplicate_kinds_register_once() {
        let classifier = ErrorClassifier::<AppError>::new()
            .with_kind(ErrorKind::of::<Timeout>())
            .with_kind(ErrorKind::of::<Timeout>());
        assert_eq!(classifier.kinds().len(), 1);
    }

    #[test]
    fn clear_restores_retry_all() {
        let mut classifier =
            ErrorClassifier::<AppError>::new().with_kind(ErrorKind::of::<Timeout>());
        assert!(!classifier.is_retryable(&AppError::Plain));
        classifier.clear();
        assert!(classifier.is_retryable(&AppError::Plain));
    }
}
