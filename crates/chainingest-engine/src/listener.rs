//! Listener: follows the chain tip.
//!
//! Each tick imports the node's latest block if it is above the watermark.
//! Heights skipped between the watermark and the new tip go to the error
//! queue for [`crate::ErrorRecovery`] to fill in.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chainingest_core::error::IngestError;
use chainingest_core::node::NodeClient;
use chainingest_core::watermark::Watermark;

use crate::engine::Pacer;
use crate::importer::Importer;

/// What a single [`Listener::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerTick {
    /// Node tip is at or below the watermark.
    UpToDate { latest: u64 },
    /// `height` was imported. `gap` holds the number of heights queued for
    /// recovery, zero if the tip followed the watermark directly.
    Imported { height: u64, gap: u64 },
}

pub struct Listener {
    node: Arc<dyn NodeClient>,
    importer: Importer,
    watermark: Watermark,
}

impl Listener {
    /// A listener starting from an explicit watermark.
    pub fn new(node: Arc<dyn NodeClient>, importer: Importer, watermark: Watermark) -> Self {
        Self {
            node,
            importer,
            watermark,
        }
    }

    /// Build a listener for a (re)starting process.
    ///
    /// If the store holds blocks, the highest one is deleted and the
    /// watermark set just below it, so the previous tip is imported again
    /// rather than trusted. An empty store starts at `start_height`, or one
    /// below the node's current tip.
    pub async fn resume(
        node: Arc<dyn NodeClient>,
        importer: Importer,
        start_height: Option<u64>,
    ) -> Result<Self, IngestError> {
        let watermark = match importer.store().latest_height().await? {
            Some(tip) => {
                importer.store().delete(tip).await?;
                info!(deleted = tip, "Rewinding past last persisted block");
                Watermark::new(tip.saturating_sub(1))
            }
            None => {
                let height = match start_height {
                    Some(h) => h,
                    None => node.latest_height().await?.saturating_sub(1),
                };
                info!(watermark = height, "Empty store, starting fresh");
                Watermark::new(height)
            }
        };
        Ok(Self::new(node, importer, watermark))
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub async fn tick(&mut self) -> Result<ListenerTick, IngestError> {
        let latest = self.node.latest_height().await?;
        if latest <= self.watermark.height() {
            return Ok(ListenerTick::UpToDate { latest });
        }

        let block = self
            .node
            .block_by_height(latest)
            .await?
            .ok_or_else(|| IngestError::not_found("block", latest))?;

        let cache = self.importer.cache();
        if let Err(e) = cache.insert_unverified_blocks(latest).await {
            warn!(height = latest, error = %e, "could not queue block for verification");
        }

        self.importer.import_tip(&block).await?;

        let mut gap = 0;
        if self.watermark.has_gap_to(latest) {
            let from = self.watermark.height();
            gap = latest - from - 1;
            match cache.insert_error_blocks(from, latest).await {
                Ok(()) => {
                    self.importer.metrics().record_gap();
                    warn!(from = from + 1, to = latest - 1, missing = gap, "gap detected");
                }
                Err(e) => warn!(from, to = latest, error = %e, "could not queue gap"),
            }
        }

        self.watermark.advance(latest);
        Ok(ListenerTick::Imported {
            height: latest,
            gap,
        })
    }

    /// Tick every `interval` until `cancel` fires.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        info!(watermark = self.watermark.height(), "Listener started");
        let mut pacer = Pacer::new(interval);
        while pacer.next(&cancel).await {
            match self.tick().await {
                Ok(ListenerTick::Imported { height, gap }) => {
                    info!(height, gap, "New block");
                }
                Ok(ListenerTick::UpToDate { latest }) => debug!(latest, "listener up to date"),
                Err(e) => warn!(
                    watermark = self.watermark.height(),
                    error = %e,
                    "listener tick failed, retrying next interval"
                ),
            }
        }
        info!(watermark = self.watermark.height(), "Listener stopped");
    }
}
