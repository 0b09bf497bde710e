//! chainingest-evm — JSON-RPC node client for EVM chains.
//!
//! [`EvmNodeClient`] implements [`chainingest_core::NodeClient`] on top of
//! `eth_blockNumber`, `eth_getBlockByNumber`, `eth_getBlockByHash` and a
//! batched `eth_getTransactionReceipt`, merging receipt fields into each
//! transaction.

pub mod client;
pub mod parse;
pub mod rpc;

pub use client::EvmNodeClient;
pub use rpc::{HttpClientConfig, HttpTransport, JsonRpcRequest, JsonRpcResponse, TransportError};
