//! Bounded worker pool for Monarch API calls.
//!
//! Each call takes a permit, runs on its own spawned task, and only the
//! tool invocation that submitted it waits for the result. When every permit
//! is taken, new calls queue until one is released.

extern crate alloc;

use alloc::sync::Arc;
use core::future::Future;

use tokio::sync::Semaphore;

/// Failure of the pool itself, as opposed to the submitted task.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PoolError {
    /// The semaphore was closed.
    #[error("worker pool is shut down")]
    Closed,

    /// The task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Runs futures on spawned tasks, at most `size` at a time.
#[derive(Debug, Clone)]
pub(crate) struct WorkerPool {
    /// One permit per worker.
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool with `size` workers (at least one).
    pub(crate) fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Runs `task` on a worker and waits for its output.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Task`] if the task panics; the panic does not
    /// propagate to the caller.
    pub(crate) async fn run<F, T>(&self, task: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_closed| PoolError::Closed)?;
        let handle = tokio::spawn(async move {
            let output = task.await;
            drop(permit);
            output
        });
        Ok(handle.await?)
    }

    /// Number of idle workers.
    #[cfg(test)]
    fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::panic,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect and panics deliberately"
)]
mod tests {
    extern crate alloc;

    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use core::time::Duration;

    use super::{PoolError, WorkerPool};

    #[tokio::test]
    async fn returns_task_output() {
        let pool = WorkerPool::new(2);
        let value = pool.run(async { 21 * 2 }).await.expect("task succeeds");
        assert_eq!(value, 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let pool = WorkerPool::new(1);
        let outcome: Result<u8, PoolError> = pool.run(async { panic!("boom") }).await;
        let err = outcome.expect_err("panic surfaces as error");
        assert!(matches!(err, PoolError::Task(_)));
        let value = pool.run(async { "still alive" }).await.expect("pool usable");
        assert_eq!(value, "still alive");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_size() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let worker_pool = pool.clone();
            let now = Arc::clone(&running);
            let max = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                worker_pool
                    .run(async move {
                        let current = now.fetch_add(1, Ordering::SeqCst) + 1;
                        let _previous = max.fetch_max(current, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let _previous = now.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("task succeeds");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }
}
