//! Admission gate bounding simultaneous capture sessions

use argos_core::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting admission gate.
///
/// Permits are RAII guards returned whenever the holder lets go of them.
/// Work that outlives its caller, such as a blocking capture, must own the
/// permit itself.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    active: Arc<AtomicUsize>,
}

/// One admitted capture operation
#[derive(Debug)]
pub struct CapturePermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl CapturePermit {
    /// Return the permit to the gate
    pub fn release(self) {}
}

impl Drop for CapturePermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyLimiter {
    /// Create a gate admitting at most `max_permits` holders (minimum 1)
    pub fn new(max_permits: usize) -> Self {
        let max_permits = max_permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_permits)),
            max_permits,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait until a permit is available
    pub async fn acquire(&self) -> Result<CapturePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Interrupted("Concurrency limiter closed".to_string()))?;
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(CapturePermit {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Configured maximum
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    pub fn in_use(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}
