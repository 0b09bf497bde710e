//! In-memory block store.
//!
//! Keeps full blocks (transactions included) in a height-ordered map.
//! Useful for tests and short-lived engines that don't need persistence.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chainingest_core::error::IngestError;
use chainingest_core::store::BlockStore;
use chainingest_core::types::{Block, Page, Transaction};

/// In-memory block store. All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: Mutex<BTreeMap<u64, Block>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blocks(&self) -> Result<MutexGuard<'_, BTreeMap<u64, Block>>, IngestError> {
        self.blocks
            .lock()
            .map_err(|_| IngestError::Storage("memory store lock poisoned".into()))
    }

    /// Every stored block in ascending height order.
    pub fn snapshot(&self) -> Result<Vec<Block>, IngestError> {
        Ok(self.blocks()?.values().cloned().collect())
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> Result<usize, IngestError> {
        Ok(self.blocks()?.len())
    }

    /// Replace the block at its height without going through `insert`.
    /// Used to seed corrupted data in tests.
    pub fn overwrite(&self, block: Block) -> Result<(), IngestError> {
        self.blocks()?.insert(block.number, block);
        Ok(())
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn exists(&self, height: u64) -> Result<bool, IngestError> {
        Ok(self.blocks()?.contains_key(&height))
    }

    async fn insert(&self, block: &Block) -> Result<(), IngestError> {
        let mut blocks = self.blocks()?;
        if blocks.contains_key(&block.number) {
            return Err(IngestError::Storage(format!(
                "block {} already stored",
                block.number
            )));
        }
        blocks.insert(block.number, block.clone());
        Ok(())
    }

    async fn delete(&self, height: u64) -> Result<(), IngestError> {
        self.blocks()?.remove(&height);
        Ok(())
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IngestError> {
        Ok(self.blocks()?.get(&height).cloned())
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IngestError> {
        Ok(self
            .blocks()?
            .values()
            .find(|b| b.hash.eq_ignore_ascii_case(hash))
            .cloned())
    }

    async fn txs_by_block_height(
        &self,
        height: u64,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        let blocks = self.blocks()?;
        let block = blocks
            .get(&height)
            .ok_or_else(|| IngestError::not_found("block", height))?;
        Ok(page.slice(&block.transactions).to_vec())
    }

    async fn txs_by_block_hash(
        &self,
        hash: &str,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        let blocks = self.blocks()?;
        let block = blocks
            .values()
            .find(|b| b.hash.eq_ignore_ascii_case(hash))
            .ok_or_else(|| IngestError::not_found("block", hash))?;
        Ok(page.slice(&block.transactions).to_vec())
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Option<Transaction>, IngestError> {
        Ok(self
            .blocks()?
            .values()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| tx.hash.eq_ignore_ascii_case(hash))
            .cloned())
    }

    async fn latest_blocks(&self, page: Page) -> Result<Vec<Block>, IngestError> {
        Ok(self
            .blocks()?
            .values()
            .rev()
            .skip(page.skip)
            .take(page.limit)
            .map(Block::stripped)
            .collect())
    }

    async fn latest_transactions(&self, page: Page) -> Result<Vec<Transaction>, IngestError> {
        Ok(self
            .blocks()?
            .values()
            .rev()
            .flat_map(|b| b.transactions.iter().rev())
            .skip(page.skip)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn latest_height(&self) -> Result<Option<u64>, IngestError> {
        Ok(self.blocks()?.keys().next_back().copied())
    }
}
