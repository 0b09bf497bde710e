//! IngestEngine: runs the drivers as concurrent Tokio tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chainingest_core::cache::WindowCache;
use chainingest_core::config::EngineConfig;
use chainingest_core::error::IngestError;
use chainingest_core::metrics::IngestMetrics;
use chainingest_core::node::NodeClient;
use chainingest_core::store::BlockStore;
use chainingest_core::validate::BlockValidator;

use crate::backfill::Backfill;
use crate::importer::Importer;
use crate::listener::Listener;
use crate::reader::ExplorerReader;
use crate::recovery::{ErrorRecovery, RecoveryOutcome};
use crate::verifier::{Verifier, VerifyOutcome};

// ─── Pacer ────────────────────────────────────────────────────────────────────

/// Fixed-interval ticker that also watches a cancellation token.
///
/// Cancellation is only observed between ticks, never while a tick runs.
pub(crate) struct Pacer {
    interval: Interval,
}

impl Pacer {
    pub(crate) fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait for the next tick. Returns `false` once `cancel` has fired.
    pub(crate) async fn next(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.interval.tick() => true,
        }
    }

    /// Sleep for `delay`. Returns `false` if cancelled first.
    pub(crate) async fn sleep(delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

/// The ingestion engine. Build with [`crate::EngineBuilder`].
pub struct IngestEngine {
    config: EngineConfig,
    node: Arc<dyn NodeClient>,
    validator: Arc<dyn BlockValidator>,
    importer: Importer,
}

impl IngestEngine {
    pub(crate) fn new(
        config: EngineConfig,
        node: Arc<dyn NodeClient>,
        cache: Arc<WindowCache>,
        store: Arc<dyn BlockStore>,
        validator: Arc<dyn BlockValidator>,
    ) -> Self {
        let importer = Importer::new(cache, store, Arc::new(IngestMetrics::new()));
        Self {
            config,
            node,
            validator,
            importer,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<WindowCache> {
        self.importer.cache()
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        self.importer.store()
    }

    /// Counters shared with the running tasks.
    pub fn metrics(&self) -> Arc<IngestMetrics> {
        self.importer.metrics().clone()
    }

    /// Read-side view over the same cache, store and node.
    pub fn reader(&self) -> ExplorerReader {
        ExplorerReader::new(
            self.importer.cache().clone(),
            self.importer.store().clone(),
            self.node.clone(),
        )
    }

    /// Run until `cancel` fires, then wait for every task to finish its
    /// current tick.
    ///
    /// The listener's start-up rewind is retried every `retry_delay` until it
    /// succeeds; the other tasks start immediately.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), IngestError> {
        let cfg = &self.config;
        info!(
            window = cfg.window_size,
            listener_ms = cfg.listener_interval_ms,
            backfill_ms = cfg.backfill_interval_ms,
            verifier_ms = cfg.verifier_interval_ms,
            "Starting ingest engine"
        );

        let listener = {
            let node = self.node.clone();
            let importer = self.importer.clone();
            let start = cfg.start_height;
            let interval = cfg.listener_interval();
            let retry_delay = cfg.retry_delay();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    match Listener::resume(node.clone(), importer.clone(), start).await {
                        Ok(listener) => return listener.run(interval, cancel).await,
                        Err(e) => {
                            warn!(error = %e, "listener start-up failed, retrying");
                            if !Pacer::sleep(retry_delay, &cancel).await {
                                return;
                            }
                        }
                    }
                }
            })
        };

        let backfill = {
            let backfill = Backfill::new(
                self.node.clone(),
                self.importer.clone(),
                self.validator.clone(),
                cfg.backfill_floor,
                cfg.backfill_start,
            );
            let interval = cfg.backfill_interval();
            let retry_delay = cfg.retry_delay();
            let cancel = cancel.clone();
            tokio::spawn(async move { backfill.run(interval, retry_delay, cancel).await })
        };

        let checker = {
            let verifier = Verifier::new(
                self.node.clone(),
                self.importer.clone(),
                self.validator.clone(),
            );
            let recovery = ErrorRecovery::new(
                self.node.clone(),
                self.importer.clone(),
                cfg.recovery_max_attempts,
            );
            let interval = cfg.verifier_interval();
            let cancel = cancel.clone();
            tokio::spawn(run_checks(verifier, recovery, interval, cancel))
        };

        let results = futures::future::join_all([listener, backfill, checker]).await;
        for res in results {
            if let Err(e) = res {
                return Err(IngestError::Other(format!("engine task panicked: {e}")));
            }
        }

        let m = self.importer.metrics().snapshot();
        info!(
            imported = m.blocks_imported,
            repairs = m.repairs,
            requeues = m.requeues,
            gaps = m.gaps_detected,
            persistent_errors = m.persistent_errors,
            "Ingest engine stopped"
        );
        Ok(())
    }
}

/// Verifier and error recovery share one task: each tick runs one of each.
async fn run_checks(
    verifier: Verifier,
    mut recovery: ErrorRecovery,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("Verifier started");
    let mut pacer = Pacer::new(interval);
    while pacer.next(&cancel).await {
        match verifier.tick().await {
            Ok(VerifyOutcome::Idle) => {}
            Ok(outcome) => debug!(?outcome, "verifier tick"),
            Err(e) => warn!(error = %e, "unverified queue unavailable"),
        }
        match recovery.tick().await {
            Ok(RecoveryOutcome::Idle) => {}
            Ok(outcome) => debug!(?outcome, "recovery tick"),
            Err(e) => warn!(error = %e, "error queue unavailable"),
        }
    }
    info!("Verifier stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EngineBuilder;
    use crate::testkit::chain;
    use chainingest_core::backend::MemoryCacheBackend;
    use chainingest_core::node::MemoryNode;
    use chainingest_storage::InMemoryBlockStore;

    #[tokio::test]
    async fn pacer_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let mut pacer = Pacer::new(Duration::from_millis(1));
        assert!(pacer.next(&cancel).await);
        cancel.cancel();
        assert!(!pacer.next(&cancel).await);
        assert!(!Pacer::sleep(Duration::from_secs(60), &cancel).await);
    }

    #[tokio::test]
    async fn engine_catches_up_and_shuts_down() {
        let node = Arc::new(MemoryNode::with_blocks(chain(1, 8)));
        let store = Arc::new(InMemoryBlockStore::new());
        let engine = EngineBuilder::new()
            .listener_interval_ms(5)
            .backfill_interval_ms(1)
            .verifier_interval_ms(1)
            .retry_delay_ms(5)
            .backfill_floor(1)
            .start_height(4)
            .build(node.clone(), store.clone(), Arc::new(MemoryCacheBackend::new()))
            .unwrap();
        let metrics = engine.metrics();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(engine.run(cancel.clone()));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.block_count().unwrap() < 8 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(store.block_count().unwrap(), 8);
        assert!(metrics.snapshot().blocks_imported >= 8);
    }
}
