#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("service unavailable")]
    Unavailable,
    #[error("request rejected")]
    Rejected,
}

/// Operation that fails with `error` for the first `failures` calls, then returns the call number.
#[derive(Debug, Clone)]
pub struct Flaky {
    failures: usize,
    error: ServiceError,
    calls: Arc<AtomicUsize>,
}

impl Flaky {
    pub fn new(failures: usize, error: ServiceError) -> Self {
        Self { failures, error, calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn always(error: ServiceError) -> Self {
        Self::new(usize::MAX, error)
    }

    pub fn call(&self) -> Result<usize, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.failures {
            Ok(n)
        } else {
            Err(self.error.clone())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
