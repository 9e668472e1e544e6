//! Bounded worker pool for batch investigations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use tenposcan_common::TenposcanError;

/// Hard cap on concurrent investigations regardless of batch size.
pub const MAX_POOL_SIZE: usize = 8;

/// Concurrency for a batch of `n` companies. Grows with the batch (one
/// extra worker per five companies) and never shrinks as `n` rises:
/// larger batches should never be given less parallelism.
pub fn pool_size(n: usize) -> usize {
    (1 + n / 5).clamp(1, MAX_POOL_SIZE)
}

/// Semaphore-backed pool. The semaphore is created lazily on first
/// acquire, so constructing a pool is free; `shutdown` is idempotent
/// and wakes any waiters with an error.
pub struct WorkerPool {
    size: usize,
    inner: OnceLock<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.clamp(1, MAX_POOL_SIZE),
            inner: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Pool sized for a batch of `n` companies.
    pub fn for_batch(n: usize) -> Self {
        Self::new(pool_size(n))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn semaphore(&self) -> &Arc<Semaphore> {
        self.inner
            .get_or_init(|| Arc::new(Semaphore::new(self.size)))
    }

    /// Wait for a worker slot. Fails with [`TenposcanError::PoolClosed`]
    /// once the pool has been shut down, including for callers already
    /// parked in the queue.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, TenposcanError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TenposcanError::PoolClosed);
        }
        let sem = Arc::clone(self.semaphore());
        sem.acquire_owned()
            .await
            .map_err(|_| TenposcanError::PoolClosed)
    }

    /// Close the pool. Safe to call more than once; only the first call
    /// does anything.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Close the semaphore even if nothing acquired yet, so
            // late acquires fail rather than hang.
            self.semaphore().close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_is_monotonic_and_capped() {
        let mut last = 0;
        for n in 0..200 {
            let size = pool_size(n);
            assert!(size >= last, "pool_size({n}) shrank");
            assert!((1..=MAX_POOL_SIZE).contains(&size));
            last = size;
        }
        assert_eq!(pool_size(0), 1);
        assert_eq!(pool_size(1), 1);
        assert_eq!(pool_size(200), MAX_POOL_SIZE);
    }

    #[tokio::test]
    async fn acquire_respects_size() {
        let pool = WorkerPool::new(2);
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), pool.acquire())
                .await
                .is_err()
        );
        drop(a);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_fails_acquire() {
        let pool = WorkerPool::new(2);
        pool.shutdown();
        pool.shutdown();
        assert!(matches!(
            pool.acquire().await,
            Err(TenposcanError::PoolClosed)
        ));
    }

    #[tokio::test]
    async fn shutdown_wakes_waiters() {
        let pool = Arc::new(WorkerPool::new(1));
        let _held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::task::yield_now().await;
        pool.shutdown();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(TenposcanError::PoolClosed)
        ));
    }
}
