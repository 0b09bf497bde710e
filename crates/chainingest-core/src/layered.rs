//! Generic layered reader: try each tier in order, fall through on failure.
//!
//! Explorer reads go cache → store → node. Every entity type shares this
//! fallback chain instead of repeating it per call site.

use async_trait::async_trait;
use std::sync::Arc;

use tracing::debug;

use crate::error::IngestError;

/// One source of `V` values keyed by `K`.
#[async_trait]
pub trait Tier<K, V>: Send + Sync
where
    K: Sync + ?Sized,
    V: Send,
{
    /// Short label for logs (`"cache"`, `"store"`, `"node"`).
    fn name(&self) -> &'static str;

    async fn fetch(&self, key: &K) -> Result<V, IngestError>;
}

/// Ordered list of tiers for a single entity type.
pub struct LayeredReader<K: Sync + ?Sized, V: Send> {
    tiers: Vec<Arc<dyn Tier<K, V>>>,
}

impl<K: Sync + ?Sized, V: Send> LayeredReader<K, V> {
    pub fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    /// Append a tier; tiers are consulted in insertion order.
    pub fn tier(mut self, tier: Arc<dyn Tier<K, V>>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// First successful value. If every tier fails, the last tier's error.
    pub async fn read(&self, key: &K) -> Result<V, IngestError> {
        let mut last_err = None;
        for tier in &self.tiers {
            match tier.fetch(key).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(tier = tier.name(), error = %e, "tier miss, falling through");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| IngestError::Other("layered reader has no tiers".into())))
    }
}

impl<K: Sync + ?Sized, V: Send> Default for LayeredReader<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixed {
        name: &'static str,
        value: Option<u64>,
        calls: AtomicU32,
    }

    impl Fixed {
        fn new(name: &'static str, value: Option<u64>) -> Arc<Self> {
            Arc::new(Self {
                name,
                value,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Tier<u64, u64> for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, key: &u64) -> Result<u64, IngestError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.value
                .map(|v| v + key)
                .ok_or_else(|| IngestError::not_found("value", key))
        }
    }

    #[tokio::test]
    async fn falls_through_to_first_hit() {
        let cache = Fixed::new("cache", None);
        let store = Fixed::new("store", Some(100));
        let node = Fixed::new("node", Some(1000));
        let reader = LayeredReader::<u64, u64>::new()
            .tier(cache.clone())
            .tier(store.clone())
            .tier(node.clone());

        assert_eq!(reader.read(&1).await.unwrap(), 101);
        assert_eq!(cache.calls.load(Ordering::Relaxed), 1);
        assert_eq!(node.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn all_tiers_missing_returns_last_error() {
        let reader = LayeredReader::<u64, u64>::new()
            .tier(Fixed::new("cache", None))
            .tier(Fixed::new("store", None));
        assert!(reader.read(&5).await.unwrap_err().is_not_found());
    }
}
