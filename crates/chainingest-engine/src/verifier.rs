//! Verifier: re-checks recently imported heights against the node.

use std::sync::Arc;

use tracing::{debug, warn};

use chainingest_core::error::IngestError;
use chainingest_core::node::NodeClient;
use chainingest_core::types::Block;
use chainingest_core::validate::BlockValidator;

use crate::importer::Importer;

/// What a single [`Verifier::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The unverified queue was empty.
    Idle,
    /// The stored block matched. Nothing is recorded.
    Confirmed { height: u64 },
    /// The stored block was missing or wrong and has been replaced.
    Repaired { height: u64 },
    /// The check could not complete; the height is back in the queue.
    Requeued { height: u64 },
}

/// Pops one height per tick from the unverified queue.
///
/// There is no attempt limit: a height whose network fetch keeps failing is
/// requeued forever.
pub struct Verifier {
    node: Arc<dyn NodeClient>,
    importer: Importer,
    validator: Arc<dyn BlockValidator>,
}

impl Verifier {
    pub fn new(
        node: Arc<dyn NodeClient>,
        importer: Importer,
        validator: Arc<dyn BlockValidator>,
    ) -> Self {
        Self {
            node,
            importer,
            validator,
        }
    }

    /// Only a failure of the queue itself is returned as an error.
    pub async fn tick(&self) -> Result<VerifyOutcome, IngestError> {
        let Some(height) = self.importer.cache().pop_unverified_block_height().await? else {
            return Ok(VerifyOutcome::Idle);
        };

        let network = match self.node.block_by_height(height).await {
            Ok(Some(block)) => block,
            Ok(None) => {
                warn!(height, "node has no block at unverified height");
                return self.requeue(height).await;
            }
            Err(e) => {
                warn!(height, error = %e, "network fetch failed during verification");
                return self.requeue(height).await;
            }
        };

        if self.stored_matches(height, &network).await {
            debug!(height, "block verified");
            return Ok(VerifyOutcome::Confirmed { height });
        }

        match self.importer.reimport(&network).await {
            Ok(()) => {
                warn!(height, hash = %network.hash, "repaired block from network");
                Ok(VerifyOutcome::Repaired { height })
            }
            Err(e) => {
                warn!(height, error = %e, "repair failed");
                self.requeue(height).await
            }
        }
    }

    async fn stored_matches(&self, height: u64, network: &Block) -> bool {
        match self.importer.store().block_by_height(height).await {
            Ok(Some(stored)) => self.validator.is_valid(&stored, network),
            Ok(None) => false,
            Err(e) => {
                warn!(height, error = %e, "could not read stored block");
                false
            }
        }
    }

    async fn requeue(&self, height: u64) -> Result<VerifyOutcome, IngestError> {
        self.importer.cache().insert_unverified_blocks(height).await?;
        self.importer.metrics().record_requeue();
        Ok(VerifyOutcome::Requeued { height })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{block, chain, Harness};
    use chainingest_core::node::MemoryNode;
    use chainingest_core::store::BlockStore;
    use chainingest_core::validate::{FullMatch, HashMatch};

    fn verifier(h: &Harness) -> Verifier {
        Verifier::new(h.node.clone(), h.importer.clone(), Arc::new(HashMatch))
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let h = Harness::new();
        assert_eq!(verifier(&h).tick().await.unwrap(), VerifyOutcome::Idle);
    }

    #[tokio::test]
    async fn matching_block_confirmed_without_marker() {
        let h = Harness::with_node(MemoryNode::with_blocks(chain(1, 3)));
        h.importer.import(&block(2, 1)).await.unwrap();
        h.cache.insert_unverified_blocks(2).await.unwrap();

        assert_eq!(
            verifier(&h).tick().await.unwrap(),
            VerifyOutcome::Confirmed { height: 2 }
        );
        assert_eq!(h.cache.unverified_queue_len().await.unwrap(), 0);
        assert_eq!(h.metrics.snapshot().repairs, 0);
    }

    #[tokio::test]
    async fn mismatch_replaced_with_network_block() {
        let h = Harness::with_node(MemoryNode::with_blocks(chain(1, 3)));
        let mut forked = block(2, 0);
        forked.hash = "0xforked".into();
        h.store.insert(&forked).await.unwrap();
        h.cache.insert_unverified_blocks(2).await.unwrap();

        assert_eq!(
            verifier(&h).tick().await.unwrap(),
            VerifyOutcome::Repaired { height: 2 }
        );
        assert_eq!(h.store.block_by_height(2).await.unwrap(), Some(block(2, 1)));
    }

    #[tokio::test]
    async fn missing_stored_block_is_imported() {
        let h = Harness::with_node(MemoryNode::with_blocks(chain(1, 3)));
        h.cache.insert_unverified_blocks(3).await.unwrap();
        assert_eq!(
            verifier(&h).tick().await.unwrap(),
            VerifyOutcome::Repaired { height: 3 }
        );
        assert!(h.store.exists(3).await.unwrap());
    }

    #[tokio::test]
    async fn network_failure_requeues_indefinitely() {
        let h = Harness::with_node(MemoryNode::with_blocks(chain(1, 3)));
        h.cache.insert_unverified_blocks(2).await.unwrap();
        h.node.set_offline(true);

        let v = verifier(&h);
        for _ in 0..10 {
            assert_eq!(v.tick().await.unwrap(), VerifyOutcome::Requeued { height: 2 });
        }
        assert_eq!(h.cache.unverified_block_heights().await.unwrap(), vec![2]);
        assert!(h.cache.persistent_error_block_heights().await.unwrap().is_empty());
        assert_eq!(h.metrics.snapshot().requeues, 10);
    }

    #[tokio::test]
    async fn failed_repair_requeues() {
        let h = Harness::with_node(MemoryNode::with_blocks(chain(1, 3)));
        h.cache.insert_unverified_blocks(1).await.unwrap();
        h.store.fail_writes(true);
        assert_eq!(
            verifier(&h).tick().await.unwrap(),
            VerifyOutcome::Requeued { height: 1 }
        );
        assert_eq!(h.cache.unverified_block_heights().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn strict_predicate_catches_receipt_drift() {
        let h = Harness::with_node(MemoryNode::with_blocks(chain(1, 3)));
        let mut drifted = block(2, 1);
        drifted.transactions[0].status = Some(0);
        h.store.insert(&drifted).await.unwrap();
        h.cache.insert_unverified_blocks(2).await.unwrap();
        h.cache.insert_unverified_blocks(2).await.unwrap();

        assert_eq!(
            verifier(&h).tick().await.unwrap(),
            VerifyOutcome::Confirmed { height: 2 }
        );
        let strict = Verifier::new(h.node.clone(), h.importer.clone(), Arc::new(FullMatch));
        assert_eq!(
            strict.tick().await.unwrap(),
            VerifyOutcome::Repaired { height: 2 }
        );
        assert_eq!(h.store.block_by_height(2).await.unwrap(), Some(block(2, 1)));
    }
}
