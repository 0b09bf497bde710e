//! The persistent store contract.
//!
//! Implementations live in `chainingest-storage` (memory, SQLite).

use async_trait::async_trait;

use crate::error::IngestError;
use crate::types::{Block, Page, Transaction};

/// Durable, queryable storage of blocks and their transactions.
///
/// Height is unique. `insert` of a height that already exists is rejected;
/// callers check `exists` first. That check is an idempotency guard, not a
/// transaction: two tasks racing on the same height may both pass it.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn exists(&self, height: u64) -> Result<bool, IngestError>;

    /// Persist a full block including its transactions.
    async fn insert(&self, block: &Block) -> Result<(), IngestError>;

    /// Delete the block at `height` and its transactions. Absent heights are a no-op.
    async fn delete(&self, height: u64) -> Result<(), IngestError>;

    /// The full block (with transactions) at `height`.
    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IngestError>;

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IngestError>;

    async fn txs_by_block_height(
        &self,
        height: u64,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError>;

    async fn txs_by_block_hash(&self, hash: &str, page: Page)
        -> Result<Vec<Transaction>, IngestError>;

    async fn tx_by_hash(&self, hash: &str) -> Result<Option<Transaction>, IngestError>;

    /// Newest-first page of stripped blocks.
    async fn latest_blocks(&self, page: Page) -> Result<Vec<Block>, IngestError>;

    /// Newest-first page of transactions (by block height, then index descending).
    async fn latest_transactions(&self, page: Page) -> Result<Vec<Transaction>, IngestError>;

    /// Highest persisted height, `None` if the store is empty.
    async fn latest_height(&self) -> Result<Option<u64>, IngestError>;
}
