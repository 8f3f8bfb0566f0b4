use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_CONCURRENCY: usize = 20;

/// Caps how many probes run at once.
///
/// Slots are handed out in request order by the underlying semaphore. The
/// limiter also counts how many slots are held right now and the highest that
/// count has ever been, so a run can report (and tests can assert) its actual
/// concurrency.
#[derive(Clone, Debug)]
pub struct Limiter {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    capacity: usize,
}

/// A held slot. Dropping it gives the slot back, whatever happened to the task.
#[derive(Debug)]
pub struct Slot {
    in_flight: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Limiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Wait for a free slot. Returns `None` once the limiter has been closed.
    pub async fn acquire(&self) -> Option<Slot> {
        let permit = self.permits.clone().acquire_owned().await.ok()?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Some(Slot {
            in_flight: self.in_flight.clone(),
            _permit: permit,
        })
    }

    /// Refuse all pending and future acquisitions. Held slots stay valid.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // runs before the permit field is dropped, so the count never exceeds capacity
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
