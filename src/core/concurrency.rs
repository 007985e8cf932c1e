//! Per-job concurrency pool.
//!
//! A counting semaphore bounding how many task chains of one job may run at
//! once. The in-use counter is only touched under a single lock; waiters are
//! woken through a [`Notify`].
//!
//! Releasing a pool that has nothing acquired is a programming error and
//! panics.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;

/// Errors that can occur when creating a pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// A pool must admit at least one holder.
    #[error("concurrency pool capacity must be at least 1")]
    ZeroCapacity,
}

/// Counting semaphore with a panic-on-double-release contract.
#[derive(Debug)]
pub struct ConcurrentPool {
    capacity: usize,
    in_use: Mutex<usize>,
    available: Notify,
}

impl ConcurrentPool {
    /// Create a pool admitting `capacity` concurrent holders.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            in_use: Mutex::new(0),
            available: Notify::new(),
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        *self.counter()
    }

    /// Wait for a free slot and take it.
    pub async fn acquire(&self) {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut in_use = self.counter();
                if *in_use < self.capacity {
                    *in_use += 1;
                    return;
                }
            }

            notified.await;
        }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        let mut in_use = self.counter();
        if *in_use < self.capacity {
            *in_use += 1;
            true
        } else {
            false
        }
    }

    /// Give a slot back and wake one waiter.
    ///
    /// # Panics
    ///
    /// Panics if nothing is currently acquired.
    pub fn release(&self) {
        {
            let mut in_use = self.counter();
            if *in_use == 0 {
                panic!("release called on a totally free pool");
            }
            *in_use -= 1;
        }
        self.available.notify_one();
    }

    /// Acquire a slot that is released when the returned permit drops, even
    /// if the holder panics.
    pub async fn acquire_owned(self: Arc<Self>) -> PoolPermit {
        self.acquire().await;
        PoolPermit { pool: self }
    }

    fn counter(&self) -> MutexGuard<'_, usize> {
        self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A held pool slot, released on drop.
#[derive(Debug)]
pub struct PoolPermit {
    pool: Arc<ConcurrentPool>,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(ConcurrentPool::new(0).unwrap_err(), PoolError::ZeroCapacity);
    }

    #[tokio::test]
    async fn test_n_acquires_then_n_releases() {
        for capacity in 1..=4 {
            let pool = ConcurrentPool::new(capacity).unwrap();
            for _ in 0..capacity {
                pool.acquire().await;
            }
            assert_eq!(pool.in_use(), capacity);
            assert!(!pool.try_acquire());

            for _ in 0..capacity {
                pool.release();
            }
            assert_eq!(pool.in_use(), 0);
        }
    }

    #[test]
    #[should_panic(expected = "release called on a totally free pool")]
    fn test_release_on_empty_pool_panics() {
        let pool = ConcurrentPool::new(2).unwrap();
        pool.release();
    }

    #[tokio::test]
    #[should_panic(expected = "release called on a totally free pool")]
    async fn test_double_release_panics() {
        let pool = ConcurrentPool::new(1).unwrap();
        pool.acquire().await;
        pool.release();
        pool.release();
    }

    #[tokio::test]
    async fn test_extra_acquire_blocks_until_release() {
        let pool = Arc::new(ConcurrentPool::new(1).unwrap());
        pool.acquire().await;

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        pool.release();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
        assert_eq!(pool.in_use(), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let pool = Arc::new(ConcurrentPool::new(3).unwrap());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = Arc::clone(&pool);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire_owned().await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn test_permit_released_on_panic() {
        let pool = Arc::new(ConcurrentPool::new(1).unwrap());

        let handle = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let _permit = pool.acquire_owned().await;
                panic!("task chain blew up");
            })
        };
        assert!(handle.await.is_err());

        assert_eq!(pool.in_use(), 0);
    }
}
