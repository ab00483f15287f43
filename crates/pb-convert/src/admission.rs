//! Global bound on concurrently running conversion processes.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Node-wide admission control for Pandoc processes.
///
/// Independent of HTTP concurrency: any number of requests may be accepted,
/// but at most `limit` of them hold a permit (and so a child process) at
/// once. The rest wait in FIFO order.
#[derive(Debug)]
pub struct AdmissionControl {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: AtomicUsize,
    spawned_total: AtomicU64,
}

/// Held for the lifetime of one conversion process.
#[derive(Debug)]
pub struct ProcessPermit {
    _permit: OwnedSemaphorePermit,
    control: Arc<AdmissionControl>,
}

impl Drop for ProcessPermit {
    fn drop(&mut self) {
        self.control.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionControl {
    /// A limit of zero is raised to one.
    pub fn new(limit: usize) -> Arc<Self> {
        let limit = limit.max(1);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: AtomicUsize::new(0),
            spawned_total: AtomicU64::new(0),
        })
    }

    /// Wait for a free process slot.
    pub async fn acquire(self: &Arc<Self>) -> pb_core::Result<ProcessPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| pb_core::Error::Internal("admission semaphore closed".into()))?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessPermit {
            _permit: permit,
            control: Arc::clone(self),
        })
    }

    pub(crate) fn record_spawn(&self) {
        self.spawned_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Conversions currently holding a process slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Processes spawned since startup.
    pub fn spawned_total(&self) -> u64 {
        self.spawned_total.load(Ordering::SeqCst)
    }
}
