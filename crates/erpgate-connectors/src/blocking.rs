//! Bounded worker pool for blocking driver calls
//!
//! RFC sessions and SQL drivers expose synchronous APIs. Running them on the
//! async executor would stall every other task, so each call is moved onto
//! tokio's blocking thread pool. A semaphore caps how many such calls run at
//! once; without it a burst of slow driver calls would grow the blocking pool
//! without limit.

use std::sync::Arc;
use std::time::Duration;

use erpgate_core::{ErpError, Result};
use tokio::sync::Semaphore;

/// Default number of concurrent blocking driver calls
pub const DEFAULT_BLOCKING_THREADS: usize = 10;

pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    /// Create a pool allowing `size` concurrent calls (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of calls that could start right now without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a blocking task with a deadline.
    ///
    /// The permit travels with the task, so a call that outlives its
    /// deadline keeps occupying a worker until the driver returns. The
    /// caller gets `ErpError::Timeout` as soon as the deadline passes.
    pub async fn run<T, F>(&self, timeout: Duration, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ErpError::Other("blocking pool is closed".to_string()))?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ErpError::Driver(format!(
                "blocking driver call failed: {}",
                join_error
            ))),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "driver call timed out");
                Err(ErpError::Timeout(format!(
                    "driver call exceeded {:.1}s",
                    timeout.as_secs_f64()
                )))
            }
        }
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKING_THREADS)
    }
}

impl std::fmt::Debug for BlockingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingPool")
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_returns_task_result() {
        let pool = BlockingPool::new(2);
        let value = pool
            .run(Duration::from_secs(1), || Ok(21 * 2))
            .await
            .expect("task succeeds");
        assert_eq!(value, 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_task_error_propagates() {
        let pool = BlockingPool::new(1);
        let err = pool
            .run(Duration::from_secs(1), || -> Result<()> {
                Err(ErpError::Backend("ORA-00942".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ErpError::Backend(_)));
    }

    #[tokio::test]
    async fn test_timeout_keeps_permit_until_task_returns() {
        let pool = BlockingPool::new(1);

        let err = pool
            .run(Duration::from_millis(20), || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ErpError::Timeout(_)));
        assert_eq!(pool.available(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_reports_driver_error() {
        let pool = BlockingPool::new(1);
        let err = pool
            .run(Duration::from_secs(1), || -> Result<()> { panic!("driver crashed") })
            .await
            .unwrap_err();
        assert!(matches!(err, ErpError::Driver(_)));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = Arc::new(BlockingPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(Duration::from_secs(5), move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.expect("join").expect("task");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        assert_eq!(BlockingPool::new(0).size(), 1);
    }
}
