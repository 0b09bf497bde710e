//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block as imported from the node.
///
/// `transactions` is only populated while a block travels through the import
/// path (node → cache/store). The cached representation is [`Block::stripped`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
    /// Proposer / miner address.
    pub miner: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    pub gas_used: u64,
    pub gas_limit: u64,
    /// Number of transactions in the block, kept even when stripped.
    pub tx_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// A copy without the transaction payload.
    pub fn stripped(&self) -> Block {
        Block {
            transactions: Vec::new(),
            ..self.clone()
        }
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A transaction with its receipt fields merged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub block_number: u64,
    pub block_hash: String,
    /// Position within the block.
    pub index: u32,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    /// Transferred value as a decimal or `0x` string, exactly as the node reports it.
    pub value: String,
    pub gas: u64,
    pub gas_price: u64,
    pub nonce: u64,
    pub input: String,
    /// Receipt status (1 = success, 0 = reverted).
    pub status: Option<u64>,
    /// Gas actually consumed, from the receipt.
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

/// A receipt log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub log_index: u32,
}

// ─── Page ─────────────────────────────────────────────────────────────────────

/// `skip`/`limit` paging used by every list read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }

    /// Exclusive end index of the page.
    pub fn end(&self) -> usize {
        self.skip.saturating_add(self.limit)
    }

    /// Apply the page to an in-memory slice, clamping at the end.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.skip.min(items.len());
        let end = self.end().min(items.len());
        &items[start..end]
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: 10 }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
