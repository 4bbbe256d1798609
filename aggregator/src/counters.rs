use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide running totals for the pipeline, owned by the server wiring
/// and shared by intake and the consumer. Reset only by a process restart,
/// never persisted.
///
/// Once the queue has drained, `received == unique_processed +
/// duplicate_dropped`, unless the store failed on some events; the
/// shortfall under `received` is then exactly the number dropped.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    received: AtomicU64,
    unique_processed: AtomicU64,
    duplicate_dropped: AtomicU64,
}

impl PipelineCounters {
    /// Events accepted at intake, i.e. enqueued. Incremented before the
    /// consumer sees them, so stats can show accepted-but-unprocessed
    /// events while the queue drains.
    pub fn add_received(&self, count: u64) {
        self.received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn incr_unique_processed(&self) {
        self.unique_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_duplicate_dropped(&self) {
        self.duplicate_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn unique_processed(&self) -> u64 {
        self.unique_processed.load(Ordering::Relaxed)
    }

    pub fn duplicate_dropped(&self) -> u64 {
        self.duplicate_dropped.load(Ordering::Relaxed)
    }
}
