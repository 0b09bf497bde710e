//! Ingestion metrics, produced here and exported by whoever owns observability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared counters updated by the engine tasks.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    blocks_imported: AtomicU64,
    import_nanos: AtomicU64,
    repairs: AtomicU64,
    requeues: AtomicU64,
    gaps_detected: AtomicU64,
    persistent_errors: AtomicU64,
}

/// Point-in-time copy of [`IngestMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_imported: u64,
    pub import_time: Duration,
    pub repairs: u64,
    pub requeues: u64,
    pub gaps_detected: u64,
    pub persistent_errors: u64,
}

impl MetricsSnapshot {
    pub fn average_import_time(&self) -> Option<Duration> {
        if self.blocks_imported == 0 {
            return None;
        }
        Some(Duration::from_nanos(
            (self.import_time.as_nanos() / self.blocks_imported as u128) as u64,
        ))
    }
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_import(&self, elapsed: Duration) {
        self.blocks_imported.fetch_add(1, Ordering::Relaxed);
        self.import_nanos
            .fetch_add(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);
    }

    pub fn record_repair(&self) {
        self.repairs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue(&self) {
        self.requeues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap(&self) {
        self.gaps_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistent_error(&self) {
        self.persistent_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_imported: self.blocks_imported.load(Ordering::Relaxed),
            import_time: Duration::from_nanos(self.import_nanos.load(Ordering::Relaxed)),
            repairs: self.repairs.load(Ordering::Relaxed),
            requeues: self.requeues.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            persistent_errors: self.persistent_errors.load(Ordering::Relaxed),
        }
    }
}
