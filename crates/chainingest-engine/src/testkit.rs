//! Shared fixtures for unit tests.

use async_trait::async_trait;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chainingest_core::backend::{CacheBackend, MemoryCacheBackend};
use chainingest_core::cache::{WindowCache, WindowConfig};
use chainingest_core::error::IngestError;
use chainingest_core::metrics::IngestMetrics;
use chainingest_core::node::MemoryNode;
use chainingest_core::store::BlockStore;
use chainingest_core::types::{Block, Page, Transaction};
use chainingest_storage::InMemoryBlockStore;

use crate::importer::Importer;

pub fn tx(height: u64, i: u32) -> Transaction {
    Transaction {
        hash: format!("0xtx{height}_{i}"),
        block_number: height,
        block_hash: format!("0x{height}"),
        index: i,
        from: "0xfrom".into(),
        to: Some("0xto".into()),
        value: "0x1".into(),
        gas: 21_000,
        gas_price: 1,
        nonce: i as u64,
        input: "0x".into(),
        status: Some(1),
        gas_used: Some(21_000),
        logs: vec![],
    }
}

pub fn block(height: u64, txs: u32) -> Block {
    Block {
        number: height,
        hash: format!("0x{height}"),
        parent_hash: format!("0x{}", height.saturating_sub(1)),
        miner: "0xminer".into(),
        timestamp: height as i64 * 12,
        gas_used: 21_000 * txs as u64,
        gas_limit: 30_000_000,
        tx_count: txs,
        transactions: (0..txs).map(|i| tx(height, i)).collect(),
    }
}

/// A chain of `from..=to` with one transaction per block.
pub fn chain(from: u64, to: u64) -> Vec<Block> {
    (from..=to).map(|h| block(h, 1)).collect()
}

/// In-memory store whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryBlockStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), IngestError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IngestError::Storage("disk full".into()));
        }
        Ok(())
    }
}

impl Deref for FlakyStore {
    type Target = InMemoryBlockStore;

    fn deref(&self) -> &InMemoryBlockStore {
        &self.inner
    }
}

#[async_trait]
impl BlockStore for FlakyStore {
    async fn exists(&self, height: u64) -> Result<bool, IngestError> {
        self.inner.exists(height).await
    }

    async fn insert(&self, block: &Block) -> Result<(), IngestError> {
        self.check()?;
        self.inner.insert(block).await
    }

    async fn delete(&self, height: u64) -> Result<(), IngestError> {
        self.check()?;
        self.inner.delete(height).await
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IngestError> {
        self.inner.block_by_height(height).await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IngestError> {
        self.inner.block_by_hash(hash).await
    }

    async fn txs_by_block_height(
        &self,
        height: u64,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        self.inner.txs_by_block_height(height, page).await
    }

    async fn txs_by_block_hash(
        &self,
        hash: &str,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        self.inner.txs_by_block_hash(hash, page).await
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Option<Transaction>, IngestError> {
        self.inner.tx_by_hash(hash).await
    }

    async fn latest_blocks(&self, page: Page) -> Result<Vec<Block>, IngestError> {
        self.inner.latest_blocks(page).await
    }

    async fn latest_transactions(&self, page: Page) -> Result<Vec<Transaction>, IngestError> {
        self.inner.latest_transactions(page).await
    }

    async fn latest_height(&self) -> Result<Option<u64>, IngestError> {
        self.inner.latest_height().await
    }
}

/// A cache backend that is down: every call fails.
pub struct DownBackend;

fn down() -> IngestError {
    IngestError::Cache("connection refused".into())
}

#[async_trait]
impl CacheBackend for DownBackend {
    async fn push_front(&self, _: &str, _: String) -> Result<usize, IngestError> {
        Err(down())
    }

    async fn push_back(&self, _: &str, _: String) -> Result<usize, IngestError> {
        Err(down())
    }

    async fn pop_front(&self, _: &str) -> Result<Option<String>, IngestError> {
        Err(down())
    }

    async fn pop_back(&self, _: &str) -> Result<Option<String>, IngestError> {
        Err(down())
    }

    async fn set_index(&self, _: &str, _: usize, _: String) -> Result<(), IngestError> {
        Err(down())
    }

    async fn range(&self, _: &str, _: usize, _: usize) -> Result<Vec<String>, IngestError> {
        Err(down())
    }

    async fn len(&self, _: &str) -> Result<usize, IngestError> {
        Err(down())
    }

    async fn get(&self, _: &str) -> Result<Option<String>, IngestError> {
        Err(down())
    }

    async fn set(&self, _: &str, _: String, _: Option<Duration>) -> Result<(), IngestError> {
        Err(down())
    }

    async fn expire(&self, _: &str, _: Duration) -> Result<bool, IngestError> {
        Err(down())
    }

    async fn exists(&self, _: &str) -> Result<bool, IngestError> {
        Err(down())
    }

    async fn delete(&self, _: &str) -> Result<bool, IngestError> {
        Err(down())
    }
}

pub fn broken_cache() -> Arc<dyn CacheBackend> {
    Arc::new(DownBackend)
}

pub struct Harness {
    pub node: Arc<MemoryNode>,
    pub store: Arc<FlakyStore>,
    pub cache: Arc<WindowCache>,
    pub metrics: Arc<IngestMetrics>,
    pub importer: Importer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_node(MemoryNode::new())
    }

    pub fn with_node(node: MemoryNode) -> Self {
        Self::build(node, Arc::new(MemoryCacheBackend::new()))
    }

    pub fn with_cache(backend: Arc<dyn CacheBackend>) -> Self {
        Self::build(MemoryNode::new(), backend)
    }

    pub fn build(node: MemoryNode, backend: Arc<dyn CacheBackend>) -> Self {
        let node = Arc::new(node);
        let store = Arc::new(FlakyStore::default());
        let cache = Arc::new(WindowCache::new(
            backend,
            WindowConfig {
                capacity: 16,
                latest_txs: 16,
                ttl: Duration::from_secs(60),
            },
        ));
        let metrics = Arc::new(IngestMetrics::new());
        let importer = Importer::new(cache.clone(), store.clone(), metrics.clone());
        Self {
            node,
            store,
            cache,
            metrics,
            importer,
        }
    }
}
