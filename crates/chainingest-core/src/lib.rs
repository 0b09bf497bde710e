//! chainingest-core — foundation for the block ingestion engine of a chain explorer.
//!
//! # Architecture
//!
//! ```text
//! IngestEngine
//!     ├── Listener   (watermark, new blocks, gap detection)
//!     ├── Backfill   (backward walk, repair against the network)
//!     └── Verifier   (unverified queue + error-block recovery)
//!              │
//!              ├── WindowCache  (recent blocks, tx lists, recovery queues)
//!              │       └── CacheBackend (ordered lists + expiring keys)
//!              ├── BlockStore   (durable blocks / transactions)
//!              └── NodeClient   (canonical chain data)
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod layered;
pub mod metrics;
pub mod node;
pub mod store;
pub mod types;
pub mod validate;
pub mod watermark;

pub use backend::{CacheBackend, MemoryCacheBackend};
pub use cache::{WindowCache, WindowConfig};
pub use config::{EngineConfig, LogConfig};
pub use error::IngestError;
pub use layered::{LayeredReader, Tier};
pub use metrics::{IngestMetrics, MetricsSnapshot};
pub use node::{MemoryNode, NodeClient};
pub use store::BlockStore;
pub use types::{Block, Log, Page, Transaction};
pub use validate::{BlockValidator, FullMatch, HashMatch};
pub use watermark::Watermark;
