//! Bounded relay pool.
//!
//! Admission is the backpressure boundary of the pipeline: [`RelayPool::submit`]
//! waits for a [`PoolSlot`] before it spawns, so a saturated pool stalls the
//! caller instead of queueing unbounded work.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::limiter::{ConcurrencyLimiter, LimiterClosed};

/// How shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every in-flight worker finished within the grace period.
    Completed,
    /// The grace period ran out; remaining workers were cancelled.
    Abandoned {
        /// Workers still running when the grace period ended.
        remaining: usize,
    },
}

/// Fixed-capacity pool of relay tasks.
#[derive(Debug, Clone)]
pub struct RelayPool {
    limiter: ConcurrencyLimiter,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl RelayPool {
    /// Pool admitting through `limiter`; `cancel` is handed to running work.
    #[must_use]
    pub fn new(limiter: ConcurrencyLimiter, cancel: CancellationToken) -> Self {
        Self {
            limiter,
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    /// Token that running work observes for shutdown.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.limiter.capacity()
    }

    /// Wait for a slot, then run `task` on its own task.
    ///
    /// The slot is held until `task` completes or panics.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterClosed`] after shutdown started.
    pub async fn submit<F>(&self, task: F) -> Result<(), LimiterClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = self.limiter.acquire().await?;
        self.tracker.spawn(async move {
            let _slot = slot;
            task.await;
        });
        Ok(())
    }

    /// Run `task` only if a slot is free now; hands it back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the task when the pool is saturated or closed.
    pub fn try_submit<F>(&self, task: F) -> Result<(), F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.limiter.try_acquire() {
            Ok(Some(slot)) => {
                self.tracker.spawn(async move {
                    let _slot = slot;
                    task.await;
                });
                Ok(())
            }
            Ok(None) | Err(LimiterClosed) => Err(task),
        }
    }

    /// Stop admitting and wait up to `grace` for in-flight work.
    ///
    /// Work still running afterwards is cancelled and abandoned.
    pub async fn shutdown(&self, grace: Duration) -> Drain {
        self.limiter.close();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            info!("Relay pool drained");
            return Drain::Completed;
        }

        let remaining = self.tracker.len();
        warn!(remaining, "Abandoning in-flight relay workers");
        self.cancel.cancel();
        Drain::Abandoned { remaining }
    }
}
