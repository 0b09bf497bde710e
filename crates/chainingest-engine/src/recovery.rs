//! Error-block recovery: fills heights the listener skipped.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use chainingest_core::error::IngestError;
use chainingest_core::node::NodeClient;

use crate::importer::{ImportOutcome, Importer};

/// What a single [`ErrorRecovery::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Idle,
    /// The store already had the height; the node was not asked.
    AlreadyStored { height: u64 },
    Recovered { height: u64 },
    /// Import failed; the height went to the back of the queue.
    Requeued { height: u64, attempts: u32 },
    /// Import failed `max_attempts` times; the height was moved to the
    /// persistent-error record and will not be retried.
    Promoted { height: u64 },
}

/// Consumer of the error queue.
///
/// Failure counts are held in memory, so a restart gives every queued height
/// a fresh set of attempts.
pub struct ErrorRecovery {
    node: Arc<dyn NodeClient>,
    importer: Importer,
    max_attempts: u32,
    attempts: HashMap<u64, u32>,
}

impl ErrorRecovery {
    pub fn new(node: Arc<dyn NodeClient>, importer: Importer, max_attempts: u32) -> Self {
        Self {
            node,
            importer,
            max_attempts: max_attempts.max(1),
            attempts: HashMap::new(),
        }
    }

    /// Failed attempts so far for `height`.
    pub fn attempts(&self, height: u64) -> u32 {
        self.attempts.get(&height).copied().unwrap_or(0)
    }

    /// Only a failure of the queue itself is returned as an error.
    pub async fn tick(&mut self) -> Result<RecoveryOutcome, IngestError> {
        let Some(height) = self.importer.cache().pop_error_block_height().await? else {
            return Ok(RecoveryOutcome::Idle);
        };

        match self.recover(height).await {
            Ok(outcome) => {
                self.attempts.remove(&height);
                Ok(outcome)
            }
            Err(e) => self.fail(height, e).await,
        }
    }

    async fn recover(&self, height: u64) -> Result<RecoveryOutcome, IngestError> {
        if self.importer.store().exists(height).await? {
            debug!(height, "error block already stored");
            return Ok(RecoveryOutcome::AlreadyStored { height });
        }
        let block = self
            .node
            .block_by_height(height)
            .await?
            .ok_or_else(|| IngestError::not_found("block", height))?;

        Ok(match self.importer.import(&block).await? {
            ImportOutcome::Inserted => {
                info!(height, "Recovered missing block");
                RecoveryOutcome::Recovered { height }
            }
            ImportOutcome::AlreadyStored => RecoveryOutcome::AlreadyStored { height },
        })
    }

    async fn fail(
        &mut self,
        height: u64,
        cause: IngestError,
    ) -> Result<RecoveryOutcome, IngestError> {
        let attempts = self.attempts.entry(height).or_insert(0);
        *attempts += 1;
        let attempts = *attempts;

        let cache = self.importer.cache();
        if attempts >= self.max_attempts {
            cache.insert_persistent_error_blocks(&[height]).await?;
            self.attempts.remove(&height);
            self.importer.metrics().record_persistent_error();
            error!(
                height,
                attempts,
                error = %cause,
                "giving up on block, recorded as persistent error"
            );
            return Ok(RecoveryOutcome::Promoted { height });
        }

        cache.requeue_error_block(height).await?;
        self.importer.metrics().record_requeue();
        warn!(height, attempts, error = %cause, "error block recovery failed, requeued");
        Ok(RecoveryOutcome::Requeued { height, attempts })
    }
}
