//! Sliding-window block cache.
//!
//! Holds the most recent `capacity` blocks (newest first) in a single list,
//! plus two derived entries per block: `hash → height` and a height-keyed
//! transaction list. Evicting a block from the tail of the window deletes
//! both derived entries.
//!
//! The same backend also carries the three recovery structures:
//! - error queue: heights suspected missing from the store (FIFO)
//! - unverified queue: heights imported but not yet checked against the node (FIFO)
//! - persistent-error record: heights that kept failing (append-only)
//!
//! Every failure here is advisory. Readers fall back to the store and then to
//! the node; writers log and carry on.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::backend::CacheBackend;
use crate::error::IngestError;
use crate::types::{Block, Page, Transaction};

const WINDOW_KEY: &str = "blocks:window";
const LATEST_TXS_KEY: &str = "txs:latest";
const ERROR_QUEUE_KEY: &str = "queue:error";
const UNVERIFIED_QUEUE_KEY: &str = "queue:unverified";
const PERSISTENT_ERRORS_KEY: &str = "errors:persistent";

fn hash_key(hash: &str) -> String {
    format!("block:hash:{hash}")
}

fn txs_key(height: u64) -> String {
    format!("block:txs:{height}")
}

/// Window and queue sizing.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Maximum number of blocks held in the window.
    pub capacity: usize,
    /// Maximum length of the "latest transactions" list.
    pub latest_txs: usize,
    /// Expiration of the derived hash index and tx-list entries.
    pub ttl: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            latest_txs: 100,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Typed view over a [`CacheBackend`]: the block window plus recovery queues.
pub struct WindowCache {
    backend: Arc<dyn CacheBackend>,
    config: WindowConfig,
}

impl WindowCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: WindowConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    // ─── Window ─────────────────────────────────────────────────────────────────

    /// Push a stripped copy of `block` to the head of the window, evicting the
    /// oldest block (and its derived entries) once the window is full.
    ///
    /// A height already in the window is replaced where it stands, so the
    /// window never holds two entries for one height.
    pub async fn insert_block(&self, block: &Block) -> Result<(), IngestError> {
        if self.replace_cached(block).await? {
            return Ok(());
        }
        if self.backend.len(WINDOW_KEY).await? >= self.config.capacity {
            self.evict_oldest().await?;
        }

        let encoded = serde_json::to_string(&block.stripped())?;
        self.backend.push_front(WINDOW_KEY, encoded).await?;
        self.backend
            .set(&hash_key(&block.hash), block.number.to_string(), Some(self.config.ttl))
            .await?;
        Ok(())
    }

    /// Overwrite the cached copy of `block.number`, if the window holds one,
    /// together with its hash index and transaction list. The window order and
    /// the "latest transactions" list are left as they are.
    ///
    /// Returns `false` when the height is not cached.
    pub async fn refresh_block(&self, block: &Block) -> Result<bool, IngestError> {
        if !self.replace_cached(block).await? {
            return Ok(false);
        }
        self.write_block_txs(block).await?;
        Ok(true)
    }

    async fn replace_cached(&self, block: &Block) -> Result<bool, IngestError> {
        let window = self.window().await?;
        let Some(index) = window.iter().position(|b| b.number == block.number) else {
            return Ok(false);
        };

        let cached = &window[index];
        let encoded = serde_json::to_string(&block.stripped())?;
        self.backend.set_index(WINDOW_KEY, index, encoded).await?;
        if cached.hash != block.hash {
            self.backend.delete(&hash_key(&cached.hash)).await?;
        }
        self.backend
            .set(&hash_key(&block.hash), block.number.to_string(), Some(self.config.ttl))
            .await?;
        debug!(height = block.number, "replaced cached block");
        Ok(true)
    }

    async fn evict_oldest(&self) -> Result<(), IngestError> {
        let Some(raw) = self.backend.pop_back(WINDOW_KEY).await? else {
            return Ok(());
        };
        let evicted: Block = serde_json::from_str(&raw)?;
        self.backend.delete(&hash_key(&evicted.hash)).await?;
        self.backend.delete(&txs_key(evicted.number)).await?;
        debug!(height = evicted.number, "evicted block from window");
        Ok(())
    }

    /// Store the block's transactions under its height and feed the capped
    /// "latest transactions" list.
    pub async fn insert_txs_of_block(&self, block: &Block) -> Result<(), IngestError> {
        if block.transactions.is_empty() {
            return Ok(());
        }
        self.write_block_txs(block).await?;

        let mut len = 0;
        for tx in &block.transactions {
            len = self
                .backend
                .push_front(LATEST_TXS_KEY, serde_json::to_string(tx)?)
                .await?;
        }
        while len > self.config.latest_txs {
            if self.backend.pop_back(LATEST_TXS_KEY).await?.is_none() {
                break;
            }
            len -= 1;
        }
        Ok(())
    }

    async fn write_block_txs(&self, block: &Block) -> Result<(), IngestError> {
        let key = txs_key(block.number);
        self.backend.delete(&key).await?;
        for tx in &block.transactions {
            self.backend.push_back(&key, serde_json::to_string(tx)?).await?;
        }
        if !block.transactions.is_empty() {
            self.backend.expire(&key, self.config.ttl).await?;
        }
        Ok(())
    }

    async fn window(&self) -> Result<Vec<Block>, IngestError> {
        self.backend
            .range(WINDOW_KEY, 0, self.config.capacity)
            .await?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(IngestError::from))
            .collect()
    }

    pub async fn block_by_height(&self, height: u64) -> Result<Block, IngestError> {
        self.window()
            .await?
            .into_iter()
            .find(|b| b.number == height)
            .ok_or_else(|| IngestError::not_found("block", height))
    }

    pub async fn block_by_hash(&self, hash: &str) -> Result<Block, IngestError> {
        self.window()
            .await?
            .into_iter()
            .find(|b| b.hash.eq_ignore_ascii_case(hash))
            .ok_or_else(|| IngestError::not_found("block", hash))
    }

    /// A page of the transactions of the block at `height`.
    ///
    /// A `skip` past the end yields an empty page, not an error.
    pub async fn txs_by_block_height(
        &self,
        height: u64,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        let key = txs_key(height);
        if !self.backend.exists(&key).await? {
            return Err(IngestError::not_found("block transactions", height));
        }
        if page.limit == 0 {
            return Ok(Vec::new());
        }
        self.backend
            .range(&key, page.skip, page.end() - 1)
            .await?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(IngestError::from))
            .collect()
    }

    pub async fn txs_by_block_hash(
        &self,
        hash: &str,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        let height = self
            .backend
            .get(&hash_key(hash))
            .await?
            .ok_or_else(|| IngestError::not_found("block", hash))?;
        let height = height
            .parse::<u64>()
            .map_err(|e| IngestError::Cache(format!("bad height index for {hash}: {e}")))?;
        self.txs_by_block_height(height, page).await
    }

    /// Newest-first page of the window. A range past the cached length is an
    /// error so the caller falls back to the store instead of serving a short page.
    pub async fn latest_blocks(&self, page: Page) -> Result<Vec<Block>, IngestError> {
        self.latest_page(WINDOW_KEY, page).await
    }

    pub async fn latest_transactions(&self, page: Page) -> Result<Vec<Transaction>, IngestError> {
        self.latest_page(LATEST_TXS_KEY, page).await
    }

    async fn latest_page<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        page: Page,
    ) -> Result<Vec<T>, IngestError> {
        let len = self.backend.len(key).await?;
        if page.end() > len {
            return Err(IngestError::OutOfRange {
                skip: page.skip,
                limit: page.limit,
                len,
            });
        }
        if page.limit == 0 {
            return Ok(Vec::new());
        }
        self.backend
            .range(key, page.skip, page.end() - 1)
            .await?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(IngestError::from))
            .collect()
    }

    // ─── Error queue ────────────────────────────────────────────────────────────

    /// Enqueue every height strictly between `start` and `end`.
    pub async fn insert_error_blocks(&self, start: u64, end: u64) -> Result<(), IngestError> {
        for height in start.saturating_add(1)..end {
            self.backend.push_back(ERROR_QUEUE_KEY, height.to_string()).await?;
        }
        Ok(())
    }

    /// Queue a single height at the back of the error queue.
    pub async fn requeue_error_block(&self, height: u64) -> Result<(), IngestError> {
        self.backend.push_back(ERROR_QUEUE_KEY, height.to_string()).await?;
        Ok(())
    }

    pub async fn pop_error_block_height(&self) -> Result<Option<u64>, IngestError> {
        self.pop_height(ERROR_QUEUE_KEY).await
    }

    pub async fn error_queue_len(&self) -> Result<usize, IngestError> {
        self.backend.len(ERROR_QUEUE_KEY).await
    }

    pub async fn insert_persistent_error_blocks(&self, heights: &[u64]) -> Result<(), IngestError> {
        for height in heights {
            self.backend
                .push_back(PERSISTENT_ERRORS_KEY, height.to_string())
                .await?;
        }
        Ok(())
    }

    pub async fn persistent_error_block_heights(&self) -> Result<Vec<u64>, IngestError> {
        self.all_heights(PERSISTENT_ERRORS_KEY).await
    }

    // ─── Unverified queue ───────────────────────────────────────────────────────

    pub async fn insert_unverified_blocks(&self, height: u64) -> Result<(), IngestError> {
        self.backend
            .push_back(UNVERIFIED_QUEUE_KEY, height.to_string())
            .await?;
        Ok(())
    }

    pub async fn pop_unverified_block_height(&self) -> Result<Option<u64>, IngestError> {
        self.pop_height(UNVERIFIED_QUEUE_KEY).await
    }

    pub async fn unverified_queue_len(&self) -> Result<usize, IngestError> {
        self.backend.len(UNVERIFIED_QUEUE_KEY).await
    }

    async fn pop_height(&self, key: &str) -> Result<Option<u64>, IngestError> {
        match self.backend.pop_front(key).await? {
            Some(raw) => parse_height(key, &raw).map(Some),
            None => Ok(None),
        }
    }

    async fn all_heights(&self, key: &str) -> Result<Vec<u64>, IngestError> {
        self.backend
            .range(key, 0, usize::MAX)
            .await?
            .iter()
            .map(|raw| parse_height(key, raw))
            .collect()
    }

    /// Snapshot of the error queue without consuming it.
    pub async fn error_block_heights(&self) -> Result<Vec<u64>, IngestError> {
        self.all_heights(ERROR_QUEUE_KEY).await
    }

    /// Snapshot of the unverified queue without consuming it.
    pub async fn unverified_block_heights(&self) -> Result<Vec<u64>, IngestError> {
        self.all_heights(UNVERIFIED_QUEUE_KEY).await
    }
}

fn parse_height(key: &str, raw: &str) -> Result<u64, IngestError> {
    raw.parse::<u64>()
        .map_err(|e| IngestError::Cache(format!("bad height '{raw}' in {key}: {e}")))
}
