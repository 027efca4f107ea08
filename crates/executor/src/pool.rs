//! The bounded *execute* pool.
//!
//! Only process execution is gated here. Draining has no pool at all: every
//! drainer task is spawned eagerly and never waits for a permit. Limiting the
//! drain side as well would reintroduce the full-pipe deadlock, because a
//! runner holding a permit could block writing into a pipe whose drainer is
//! itself waiting for a permit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fanout::{ConcurrencyLimit, ExecutionError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting permit pool of fixed capacity K, with an in-flight gauge.
#[derive(Debug, Clone)]
pub struct ExecutionPool {
    semaphore: Arc<Semaphore>,
    gauge: Arc<Gauge>,
    limit: ConcurrencyLimit,
}

/// Token held by a runner for the lifetime of its process.
///
/// Dropping it returns the permit to the pool, so every exit path of the
/// runner releases it.
#[derive(Debug)]
pub struct ExecutionPermit {
    _permit: OwnedSemaphorePermit,
    gauge: Arc<Gauge>,
}

impl ExecutionPool {
    pub fn new(limit: ConcurrencyLimit) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.get())),
            gauge: Arc::new(Gauge::default()),
            limit,
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<ExecutionPermit, ExecutionError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExecutionError::TaskAborted {
                reason: format!("execution pool unavailable: {e}"),
            })?;

        let now = self.gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);

        Ok(ExecutionPermit {
            _permit: permit,
            gauge: self.gauge.clone(),
        })
    }

    pub fn limit(&self) -> ConcurrencyLimit {
        self.limit
    }

    /// Number of permits currently held.
    pub fn active(&self) -> usize {
        self.gauge.active.load(Ordering::SeqCst)
    }

    /// Highest number of permits ever held at the same time.
    pub fn peak(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
    }
}
