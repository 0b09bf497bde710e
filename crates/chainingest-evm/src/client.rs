//! EVM node client.

use async_trait::async_trait;
use serde_json::{json, Value};

use chainingest_core::error::IngestError;
use chainingest_core::node::NodeClient;
use chainingest_core::types::Block;

use crate::parse::{block_from_json, hex_height, merge_receipt, parse_hex_u64};
use crate::rpc::{HttpClientConfig, HttpTransport};

/// [`NodeClient`] over an EVM JSON-RPC endpoint.
pub struct EvmNodeClient {
    transport: HttpTransport,
}

impl EvmNodeClient {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, IngestError> {
        Ok(Self {
            transport: HttpTransport::new(url, config)?,
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, IngestError> {
        Self::new(url, HttpClientConfig::default())
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Parse a block response and attach receipts in one batched call.
    async fn full_block(&self, raw: Value) -> Result<Option<Block>, IngestError> {
        if raw.is_null() {
            return Ok(None);
        }
        let mut block = block_from_json(&raw)?;
        let params = block
            .transactions
            .iter()
            .map(|tx| vec![json!(tx.hash)])
            .collect();
        let receipts = self
            .transport
            .call_batch("eth_getTransactionReceipt", params)
            .await?;
        for (tx, receipt) in block.transactions.iter_mut().zip(receipts.iter()) {
            merge_receipt(tx, receipt)?;
        }
        tracing::debug!(
            height = block.number,
            txs = block.transactions.len(),
            "fetched block from node"
        );
        Ok(Some(block))
    }
}

#[async_trait]
impl NodeClient for EvmNodeClient {
    async fn latest_height(&self) -> Result<u64, IngestError> {
        let v = self.transport.call("eth_blockNumber", vec![]).await?;
        let s = v
            .as_str()
            .ok_or_else(|| IngestError::Rpc(format!("unexpected eth_blockNumber result: {v}")))?;
        parse_hex_u64(s)
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IngestError> {
        let raw = self
            .transport
            .call("eth_getBlockByNumber", vec![json!(hex_height(height)), json!(true)])
            .await?;
        self.full_block(raw).await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IngestError> {
        let raw = self
            .transport
            .call("eth_getBlockByHash", vec![json!(hash), json!(true)])
            .await?;
        self.full_block(raw).await
    }
}
