//! Explorer read path: cache → store → node.
//!
//! Each entity gets a [`LayeredReader`] whose tiers are thin adapters over
//! the [`WindowCache`], the [`BlockStore`] and the [`NodeClient`]. A miss or
//! failure at one tier falls through to the next.

use async_trait::async_trait;
use std::sync::Arc;

use chainingest_core::cache::WindowCache;
use chainingest_core::error::IngestError;
use chainingest_core::layered::{LayeredReader, Tier};
use chainingest_core::node::NodeClient;
use chainingest_core::store::BlockStore;
use chainingest_core::types::{Block, Page, Transaction};

/// How a block is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKey {
    Height(u64),
    Hash(String),
}

impl BlockKey {
    fn describe(&self) -> String {
        match self {
            Self::Height(h) => h.to_string(),
            Self::Hash(hash) => hash.clone(),
        }
    }
}

/// A page of one block's transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxQuery {
    pub block: BlockKey,
    pub page: Page,
}

// ─── Tiers ────────────────────────────────────────────────────────────────────

struct CacheTier(Arc<WindowCache>);
struct StoreTier(Arc<dyn BlockStore>);
struct NodeTier(Arc<dyn NodeClient>);

#[async_trait]
impl Tier<BlockKey, Block> for CacheTier {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, key: &BlockKey) -> Result<Block, IngestError> {
        match key {
            BlockKey::Height(h) => self.0.block_by_height(*h).await,
            BlockKey::Hash(hash) => self.0.block_by_hash(hash).await,
        }
    }
}

#[async_trait]
impl Tier<TxQuery, Vec<Transaction>> for CacheTier {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, q: &TxQuery) -> Result<Vec<Transaction>, IngestError> {
        match &q.block {
            BlockKey::Height(h) => self.0.txs_by_block_height(*h, q.page).await,
            BlockKey::Hash(hash) => self.0.txs_by_block_hash(hash, q.page).await,
        }
    }
}

#[async_trait]
impl Tier<Page, Vec<Block>> for CacheTier {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, page: &Page) -> Result<Vec<Block>, IngestError> {
        self.0.latest_blocks(*page).await
    }
}

#[async_trait]
impl Tier<Page, Vec<Transaction>> for CacheTier {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, page: &Page) -> Result<Vec<Transaction>, IngestError> {
        self.0.latest_transactions(*page).await
    }
}

#[async_trait]
impl Tier<BlockKey, Block> for StoreTier {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn fetch(&self, key: &BlockKey) -> Result<Block, IngestError> {
        let block = match key {
            BlockKey::Height(h) => self.0.block_by_height(*h).await?,
            BlockKey::Hash(hash) => self.0.block_by_hash(hash).await?,
        };
        block
            .map(|b| b.stripped())
            .ok_or_else(|| IngestError::not_found("block", key.describe()))
    }
}

#[async_trait]
impl Tier<TxQuery, Vec<Transaction>> for StoreTier {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn fetch(&self, q: &TxQuery) -> Result<Vec<Transaction>, IngestError> {
        match &q.block {
            BlockKey::Height(h) => self.0.txs_by_block_height(*h, q.page).await,
            BlockKey::Hash(hash) => self.0.txs_by_block_hash(hash, q.page).await,
        }
    }
}

#[async_trait]
impl Tier<Page, Vec<Block>> for StoreTier {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn fetch(&self, page: &Page) -> Result<Vec<Block>, IngestError> {
        self.0.latest_blocks(*page).await
    }
}

#[async_trait]
impl Tier<Page, Vec<Transaction>> for StoreTier {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn fetch(&self, page: &Page) -> Result<Vec<Transaction>, IngestError> {
        self.0.latest_transactions(*page).await
    }
}

impl NodeTier {
    async fn full_block(&self, key: &BlockKey) -> Result<Block, IngestError> {
        let block = match key {
            BlockKey::Height(h) => self.0.block_by_height(*h).await?,
            BlockKey::Hash(hash) => self.0.block_by_hash(hash).await?,
        };
        block.ok_or_else(|| IngestError::not_found("block", key.describe()))
    }
}

#[async_trait]
impl Tier<BlockKey, Block> for NodeTier {
    fn name(&self) -> &'static str {
        "node"
    }

    async fn fetch(&self, key: &BlockKey) -> Result<Block, IngestError> {
        Ok(self.full_block(key).await?.stripped())
    }
}

#[async_trait]
impl Tier<TxQuery, Vec<Transaction>> for NodeTier {
    fn name(&self) -> &'static str {
        "node"
    }

    async fn fetch(&self, q: &TxQuery) -> Result<Vec<Transaction>, IngestError> {
        let block = self.full_block(&q.block).await?;
        Ok(q.page.slice(&block.transactions).to_vec())
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────────

/// Read API for explorer handlers.
///
/// Blocks come back stripped whichever tier answered; use
/// [`ExplorerReader::block_transactions`] for their transactions.
pub struct ExplorerReader {
    blocks: LayeredReader<BlockKey, Block>,
    block_txs: LayeredReader<TxQuery, Vec<Transaction>>,
    latest_blocks: LayeredReader<Page, Vec<Block>>,
    latest_txs: LayeredReader<Page, Vec<Transaction>>,
    store: Arc<dyn BlockStore>,
}

impl ExplorerReader {
    pub fn new(
        cache: Arc<WindowCache>,
        store: Arc<dyn BlockStore>,
        node: Arc<dyn NodeClient>,
    ) -> Self {
        let c = Arc::new(CacheTier(cache));
        let s = Arc::new(StoreTier(store.clone()));
        let n = Arc::new(NodeTier(node));
        Self {
            blocks: LayeredReader::<BlockKey, Block>::new()
                .tier(c.clone())
                .tier(s.clone())
                .tier(n.clone()),
            block_txs: LayeredReader::<TxQuery, Vec<Transaction>>::new()
                .tier(c.clone())
                .tier(s.clone())
                .tier(n),
            // no node tier: the node has no notion of "latest N"
            latest_blocks: LayeredReader::<Page, Vec<Block>>::new()
                .tier(c.clone())
                .tier(s.clone()),
            latest_txs: LayeredReader::<Page, Vec<Transaction>>::new()
                .tier(c)
                .tier(s),
            store,
        }
    }

    pub async fn block(&self, key: BlockKey) -> Result<Block, IngestError> {
        self.blocks.read(&key).await
    }

    pub async fn block_by_height(&self, height: u64) -> Result<Block, IngestError> {
        self.block(BlockKey::Height(height)).await
    }

    pub async fn block_by_hash(&self, hash: impl Into<String>) -> Result<Block, IngestError> {
        self.block(BlockKey::Hash(hash.into())).await
    }

    pub async fn block_transactions(
        &self,
        block: BlockKey,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        self.block_txs.read(&TxQuery { block, page }).await
    }

    pub async fn latest_blocks(&self, page: Page) -> Result<Vec<Block>, IngestError> {
        self.latest_blocks.read(&page).await
    }

    pub async fn latest_transactions(&self, page: Page) -> Result<Vec<Transaction>, IngestError> {
        self.latest_txs.read(&page).await
    }

    /// Store only; neither the cache nor the node index transactions by hash.
    pub async fn transaction(&self, hash: &str) -> Result<Transaction, IngestError> {
        self.store
            .tx_by_hash(hash)
            .await?
            .ok_or_else(|| IngestError::not_found("transaction", hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{block, chain, Harness};
    use chainingest_core::node::MemoryNode;

    fn reader(h: &Harness) -> ExplorerReader {
        ExplorerReader::new(h.cache.clone(), h.store.clone(), h.node.clone())
    }

    #[tokio::test]
    async fn block_served_from_each_tier() {
        let h = Harness::with_node(MemoryNode::with_blocks(chain(1, 3)));
        h.importer.import_tip(&block(1, 2)).await.unwrap();
        h.store.insert(&block(2, 1)).await.unwrap();
        let r = reader(&h);

        assert_eq!(r.block_by_height(1).await.unwrap(), block(1, 2).stripped());
        assert_eq!(r.block_by_hash("0x2").await.unwrap(), block(2, 1).stripped());
        assert_eq!(r.block_by_height(3).await.unwrap(), block(3, 1).stripped());
        assert!(r.block_by_height(4).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn tx_page_falls_back_to_node() {
        let h = Harness::with_node(MemoryNode::with_blocks([block(5, 4)]));
        let r = reader(&h);
        let txs = r
            .block_transactions(BlockKey::Height(5), Page::new(1, 2))
            .await
            .unwrap();
        assert_eq!(txs.iter().map(|t| t.index).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn latest_blocks_short_cache_falls_to_store() {
        let h = Harness::new();
        for b in chain(1, 4) {
            h.store.insert(&b).await.unwrap();
        }
        // only the newest two are cached
        h.cache.insert_block(&block(3, 1)).await.unwrap();
        h.cache.insert_block(&block(4, 1)).await.unwrap();
        let r = reader(&h);

        let two = r.latest_blocks(Page::new(0, 2)).await.unwrap();
        assert_eq!(two.iter().map(|b| b.number).collect::<Vec<_>>(), vec![4, 3]);
        let four = r.latest_blocks(Page::new(0, 4)).await.unwrap();
        assert_eq!(four.iter().map(|b| b.number).collect::<Vec<_>>(), vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn transaction_by_hash_from_store() {
        let h = Harness::new();
        h.store.insert(&block(9, 2)).await.unwrap();
        let r = reader(&h);
        assert_eq!(r.transaction("0xtx9_1").await.unwrap().index, 1);
        assert!(r.transaction("0xnope").await.unwrap_err().is_not_found());
    }
}
