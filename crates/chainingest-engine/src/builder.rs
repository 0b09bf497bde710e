//! Fluent builder for [`IngestEngine`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainingest_core::{MemoryCacheBackend, MemoryNode};
//! use chainingest_engine::EngineBuilder;
//! use chainingest_storage::InMemoryBlockStore;
//!
//! let engine = EngineBuilder::new()
//!     .window_size(200)
//!     .listener_interval_ms(500)
//!     .backfill_floor(19_000_000)
//!     .build(
//!         Arc::new(MemoryNode::new()),
//!         Arc::new(InMemoryBlockStore::new()),
//!         Arc::new(MemoryCacheBackend::new()),
//!     )
//!     .unwrap();
//! ```

use std::sync::Arc;

use chainingest_core::backend::CacheBackend;
use chainingest_core::cache::WindowCache;
use chainingest_core::config::EngineConfig;
use chainingest_core::error::IngestError;
use chainingest_core::node::NodeClient;
use chainingest_core::store::BlockStore;
use chainingest_core::validate::{BlockValidator, HashMatch};

use crate::engine::IngestEngine;

#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    validator: Option<Arc<dyn BlockValidator>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded config instead of the defaults.
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            validator: None,
        }
    }

    pub fn listener_interval_ms(mut self, ms: u64) -> Self {
        self.config.listener_interval_ms = ms;
        self
    }

    pub fn backfill_interval_ms(mut self, ms: u64) -> Self {
        self.config.backfill_interval_ms = ms;
        self
    }

    pub fn verifier_interval_ms(mut self, ms: u64) -> Self {
        self.config.verifier_interval_ms = ms;
        self
    }

    /// Pause after a failed backfill step or listener start-up.
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    /// Number of recent blocks kept in the cache window.
    pub fn window_size(mut self, n: usize) -> Self {
        self.config.window_size = n;
        self
    }

    pub fn latest_txs_size(mut self, n: usize) -> Self {
        self.config.latest_txs_size = n;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    /// Failed recovery attempts before a height becomes a persistent error.
    pub fn recovery_max_attempts(mut self, n: u32) -> Self {
        self.config.recovery_max_attempts = n;
        self
    }

    /// Lowest height backfill checks before returning to the tip.
    pub fn backfill_floor(mut self, height: u64) -> Self {
        self.config.backfill_floor = height;
        self
    }

    pub fn backfill_start(mut self, height: u64) -> Self {
        self.config.backfill_start = Some(height);
        self
    }

    /// Initial watermark when the store is empty.
    pub fn start_height(mut self, height: u64) -> Self {
        self.config.start_height = Some(height);
        self
    }

    /// Predicate used by backfill and the verifier. Defaults to [`HashMatch`].
    pub fn validator(mut self, validator: impl BlockValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn build_config(self) -> EngineConfig {
        self.config
    }

    /// Validate the config and wire the engine.
    pub fn build(
        self,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn BlockStore>,
        backend: Arc<dyn CacheBackend>,
    ) -> Result<IngestEngine, IngestError> {
        self.config.validate()?;
        let cache = Arc::new(WindowCache::new(backend, self.config.window()));
        let validator = self.validator.unwrap_or_else(|| Arc::new(HashMatch));
        Ok(IngestEngine::new(self.config, node, cache, store, validator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainingest_core::backend::MemoryCacheBackend;
    use chainingest_core::node::MemoryNode;
    use chainingest_storage::InMemoryBlockStore;

    #[test]
    fn builder_defaults() {
        let cfg = EngineBuilder::new().build_config();
        assert_eq!(cfg.window_size, 100);
        assert_eq!(cfg.listener_interval_ms, 1000);
        assert_eq!(cfg.recovery_max_attempts, 5);
        assert!(cfg.start_height.is_none());
    }

    #[test]
    fn builder_custom() {
        let cfg = EngineBuilder::new()
            .window_size(8)
            .latest_txs_size(4)
            .backfill_floor(10)
            .backfill_start(20)
            .recovery_max_attempts(2)
            .build_config();
        assert_eq!(cfg.window_size, 8);
        assert_eq!(cfg.latest_txs_size, 4);
        assert_eq!(cfg.backfill_floor, 10);
        assert_eq!(cfg.backfill_start, Some(20));
        assert_eq!(cfg.recovery_max_attempts, 2);
    }

    #[test]
    fn build_rejects_invalid_config() {
        let err = EngineBuilder::new()
            .window_size(0)
            .build(
                Arc::new(MemoryNode::new()),
                Arc::new(InMemoryBlockStore::new()),
                Arc::new(MemoryCacheBackend::new()),
            )
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn build_applies_window() {
        let engine = EngineBuilder::new()
            .window_size(3)
            .build(
                Arc::new(MemoryNode::new()),
                Arc::new(InMemoryBlockStore::new()),
                Arc::new(MemoryCacheBackend::new()),
            )
            .unwrap();
        assert_eq!(engine.cache().config().capacity, 3);
    }
}
