//! Bounded worker pool for CPU-bound work.
//!
//! Hashing, PDF parsing, and chunking are synchronous, CPU-heavy operations
//! that must never run on the event-dispatch path. [`CpuPool`] wraps
//! `tokio::task::spawn_blocking` behind a semaphore so callers get explicit
//! backpressure instead of unbounded blocking-thread growth: `run` suspends
//! until a permit is free, executes the closure off the async runtime, and
//! returns its output.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors surfaced by [`CpuPool::run`].
#[derive(Debug, Error, Diagnostic)]
pub enum WorkerError {
    /// The pool was closed while waiting for a permit.
    #[error("worker pool closed")]
    #[diagnostic(code(inkstream::workers::closed))]
    Closed,

    /// The offloaded closure panicked or was cancelled.
    #[error("worker task failed: {0}")]
    #[diagnostic(code(inkstream::workers::join))]
    Join(String),
}

/// Semaphore-bounded `spawn_blocking` pool.
///
/// Cloning is cheap; clones share the same permit budget.
#[derive(Clone, Debug)]
pub struct CpuPool {
    permits: Arc<Semaphore>,
}

impl CpuPool {
    /// Create a pool allowing at most `max_concurrent` in-flight tasks.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run `f` on a blocking thread, waiting for a free permit first.
    pub async fn run<T, F>(&self, f: F) -> Result<T, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::Closed)?;

        tokio::task::spawn_blocking(f)
            .await
            .map_err(|err| WorkerError::Join(err.to_string()))
    }

    /// Number of currently available permits.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for CpuPool {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_closure_and_returns_output() {
        let pool = CpuPool::new(2);
        let out = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn bounded_permits_are_restored() {
        let pool = CpuPool::new(1);
        assert_eq!(pool.available(), 1);
        pool.run(|| ()).await.unwrap();
        assert_eq!(pool.available(), 1);
    }
}
