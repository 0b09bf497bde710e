//! The single import path shared by every driver.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use chainingest_core::cache::WindowCache;
use chainingest_core::error::IngestError;
use chainingest_core::metrics::IngestMetrics;
use chainingest_core::store::BlockStore;
use chainingest_core::types::Block;

/// Result of [`Importer::import`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Inserted,
    /// The store already held this height; nothing was written to it.
    AlreadyStored,
}

/// Writes blocks to the store (authoritative) and, for the chain tip only, to
/// the cache window (best effort).
///
/// Only [`Importer::import_tip`] pushes to the window, so it stays ordered
/// newest first. Historical imports never appear there; a repair only
/// refreshes a height the window already holds.
///
/// Cloning is cheap: every handle is an `Arc`.
#[derive(Clone)]
pub struct Importer {
    cache: Arc<WindowCache>,
    store: Arc<dyn BlockStore>,
    metrics: Arc<IngestMetrics>,
}

impl Importer {
    pub fn new(
        cache: Arc<WindowCache>,
        store: Arc<dyn BlockStore>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            cache,
            store,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<WindowCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Import `block` into the store without touching the cache.
    ///
    /// The existence check before the insert is not a transaction. Two tasks
    /// importing the same height at once may both pass it, and the loser gets
    /// the store's duplicate error.
    pub async fn import(&self, block: &Block) -> Result<ImportOutcome, IngestError> {
        let started = Instant::now();

        if self.store.exists(block.number).await? {
            debug!(height = block.number, "block already stored");
            return Ok(ImportOutcome::AlreadyStored);
        }
        self.store.insert(block).await?;

        self.metrics.record_import(started.elapsed());
        debug!(
            height = block.number,
            hash = %block.hash,
            txs = block.transactions.len(),
            "block imported"
        );
        Ok(ImportOutcome::Inserted)
    }

    /// Import the new chain tip, then push it to the head of the cache window.
    ///
    /// The cache is written only after the store accepted the block. Cache
    /// failures are logged and ignored.
    pub async fn import_tip(&self, block: &Block) -> Result<ImportOutcome, IngestError> {
        let outcome = self.import(block).await?;
        if outcome == ImportOutcome::Inserted {
            if let Err(e) = self.cache.insert_block(block).await {
                warn!(height = block.number, error = %e, "cache block write failed");
            }
            if let Err(e) = self.cache.insert_txs_of_block(block).await {
                warn!(height = block.number, error = %e, "cache tx write failed");
            }
        }
        Ok(outcome)
    }

    /// Replace whatever the store holds at `block.number` with `block`. A
    /// cached copy of that height is overwritten in place.
    pub async fn reimport(&self, block: &Block) -> Result<(), IngestError> {
        self.store.delete(block.number).await?;
        self.import(block).await?;
        if let Err(e) = self.cache.refresh_block(block).await {
            warn!(height = block.number, error = %e, "cache refresh after repair failed");
        }
        self.metrics.record_repair();
        Ok(())
    }
}
