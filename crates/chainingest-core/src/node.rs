//! The node query contract, plus an in-memory chain for tests and demos.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::IngestError;
use crate::types::Block;

/// Read-only queries against a blockchain node.
///
/// Blocks are returned in full: transactions with their receipt fields merged.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn latest_height(&self) -> Result<u64, IngestError>;

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IngestError>;

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IngestError>;
}

// ─── In-memory node ───────────────────────────────────────────────────────────

/// A scripted chain held in memory.
///
/// The latest height is the highest block present unless overridden with
/// [`MemoryNode::set_latest`]. [`MemoryNode::set_offline`] makes every call
/// fail with a transient RPC error.
#[derive(Default)]
pub struct MemoryNode {
    blocks: Mutex<BTreeMap<u64, Block>>,
    latest: Mutex<Option<u64>>,
    offline: AtomicBool,
}

impl MemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let node = Self::new();
        for b in blocks {
            node.put(b);
        }
        node
    }

    fn blocks(&self) -> MutexGuard<'_, BTreeMap<u64, Block>> {
        self.blocks.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add or replace the block at its height.
    pub fn put(&self, block: Block) {
        self.blocks().insert(block.number, block);
    }

    pub fn remove(&self, height: u64) {
        self.blocks().remove(&height);
    }

    pub fn set_latest(&self, height: Option<u64>) {
        *self.latest.lock().unwrap_or_else(|p| p.into_inner()) = height;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), IngestError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(IngestError::Rpc("node unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeClient for MemoryNode {
    async fn latest_height(&self) -> Result<u64, IngestError> {
        self.check_online()?;
        if let Some(h) = *self.latest.lock().unwrap_or_else(|p| p.into_inner()) {
            return Ok(h);
        }
        Ok(self.blocks().keys().next_back().copied().unwrap_or(0))
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IngestError> {
        self.check_online()?;
        Ok(self.blocks().get(&height).cloned())
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IngestError> {
        self.check_online()?;
        Ok(self
            .blocks()
            .values()
            .find(|b| b.hash.eq_ignore_ascii_case(hash))
            .cloned())
    }
}
