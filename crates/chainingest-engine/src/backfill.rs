//! Backfill: walks history backwards checking the store against the node.
//!
//! The cursor starts at `backfill_start` (or the node tip) and moves down one
//! height per step. After the floor it re-reads the tip and starts again, so
//! the walk never ends. A stored block that fails the [`BlockValidator`] is
//! deleted and imported again. Backfill never fills holes itself: a height
//! the store lacks goes to the error queue, where [`crate::ErrorRecovery`]
//! imports it.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chainingest_core::error::IngestError;
use chainingest_core::node::NodeClient;
use chainingest_core::types::Block;
use chainingest_core::validate::BlockValidator;

use crate::engine::Pacer;
use crate::importer::Importer;

/// What a single [`Backfill::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillStep {
    /// The walk (re)started from the node tip.
    Restarted { latest: u64 },
    /// The stored block passed validation.
    Valid { height: u64 },
    /// The store had no block at `height`; it was sent to the error queue.
    Queued { height: u64 },
    /// The stored block failed validation and was replaced.
    Repaired { height: u64 },
}

pub struct Backfill {
    node: Arc<dyn NodeClient>,
    importer: Importer,
    validator: Arc<dyn BlockValidator>,
    floor: u64,
    cursor: Option<u64>,
}

impl Backfill {
    /// `start` is the first height to check; `None` starts from the node tip.
    pub fn new(
        node: Arc<dyn NodeClient>,
        importer: Importer,
        validator: Arc<dyn BlockValidator>,
        floor: u64,
        start: Option<u64>,
    ) -> Self {
        Self {
            node,
            importer,
            validator,
            floor,
            cursor: start,
        }
    }

    /// Next height to be checked, `None` when the tip must be re-read.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Check one height. On error the cursor stays put and the same height is
    /// tried again on the next step.
    pub async fn step(&mut self) -> Result<BackfillStep, IngestError> {
        let height = match self.cursor {
            Some(h) if h >= self.floor => h,
            _ => {
                let latest = self.node.latest_height().await?;
                self.cursor = Some(latest);
                return Ok(BackfillStep::Restarted { latest });
            }
        };

        let outcome = match self.importer.store().block_by_height(height).await? {
            None => {
                self.queue_missing(height).await;
                BackfillStep::Queued { height }
            }
            Some(stored) => self.check(stored, height).await?,
        };

        self.cursor = if height > self.floor {
            Some(height - 1)
        } else {
            None
        };
        Ok(outcome)
    }

    async fn check(&self, stored: Block, height: u64) -> Result<BackfillStep, IngestError> {
        let network = self
            .node
            .block_by_height(height)
            .await?
            .ok_or_else(|| IngestError::not_found("block", height))?;

        if self.validator.is_valid(&stored, &network) {
            return Ok(BackfillStep::Valid { height });
        }
        warn!(
            height,
            stored = %stored.hash,
            network = %network.hash,
            "stored block failed validation, repairing"
        );
        self.importer.reimport(&network).await?;
        Ok(BackfillStep::Repaired { height })
    }

    async fn queue_missing(&self, height: u64) {
        match self.importer.cache().requeue_error_block(height).await {
            Ok(()) => debug!(height, "backfill: block missing from store, queued for recovery"),
            Err(e) => warn!(height, error = %e, "could not queue missing block"),
        }
    }

    /// Step every `interval` until `cancel` fires. A failed step waits
    /// `retry_delay` before the same height is tried again.
    pub async fn run(
        mut self,
        interval: Duration,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) {
        info!(floor = self.floor, cursor = ?self.cursor, "Backfill started");
        let mut pacer = Pacer::new(interval);
        while pacer.next(&cancel).await {
            match self.step().await {
                Ok(BackfillStep::Restarted { latest }) => {
                    info!(latest, floor = self.floor, "Backfill pass starting from tip");
                }
                Ok(BackfillStep::Valid { height }) => debug!(height, "backfill: block valid"),
                Ok(BackfillStep::Queued { .. }) => {}
                Ok(BackfillStep::Repaired { height }) => info!(height, "Backfill repaired block"),
                Err(e) => {
                    warn!(cursor = ?self.cursor, error = %e, "backfill step failed, retrying");
                    if !Pacer::sleep(retry_delay, &cancel).await {
                        break;
                    }
                }
            }
        }
        info!(cursor = ?self.cursor, "Backfill stopped");
    }
}
