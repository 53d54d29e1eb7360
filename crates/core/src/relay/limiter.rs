//! Fixed-capacity concurrency limiter.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// The limiter was closed and admits no more work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("concurrency limiter is closed")]
pub struct LimiterClosed;

/// Admission ticket. Dropping it releases the slot.
#[derive(Debug)]
pub struct PoolSlot {
    _permit: OwnedSemaphorePermit,
}

/// Gates how many relay workers run at once.
///
/// Owned and passed explicitly to whoever admits work; clones share slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Limiter with `capacity` slots. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterClosed`] once [`ConcurrencyLimiter::close`] was called.
    pub async fn acquire(&self) -> Result<PoolSlot, LimiterClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)?;
        Ok(PoolSlot { _permit: permit })
    }

    /// Take a slot only if one is free right now.
    ///
    /// # Errors
    ///
    /// Returns `Ok(None)` when saturated and [`LimiterClosed`] once closed.
    pub fn try_acquire(&self) -> Result<Option<PoolSlot>, LimiterClosed> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(Some(PoolSlot { _permit: permit })),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(LimiterClosed),
        }
    }

    /// Configured number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop admitting; pending and future acquisitions fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
