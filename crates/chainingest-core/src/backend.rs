//! Cache backend: the ordered-list / expiring key-value primitives the
//! window cache is built on.
//!
//! The trait mirrors the small subset of Redis list and string commands the
//! cache needs. Every call must be atomic at the backend; the engine relies on
//! that for its queues instead of taking locks of its own.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::IngestError;

/// Ordered-list and key-value operations over string values.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Push `value` to the head of the list at `key`. Returns the new length.
    async fn push_front(&self, key: &str, value: String) -> Result<usize, IngestError>;

    /// Push `value` to the tail of the list at `key`. Returns the new length.
    async fn push_back(&self, key: &str, value: String) -> Result<usize, IngestError>;

    /// Remove and return the head of the list.
    async fn pop_front(&self, key: &str) -> Result<Option<String>, IngestError>;

    /// Remove and return the tail of the list.
    async fn pop_back(&self, key: &str) -> Result<Option<String>, IngestError>;

    /// Overwrite the list element at `index`. Errors if the list is absent or
    /// shorter than `index + 1`.
    async fn set_index(&self, key: &str, index: usize, value: String) -> Result<(), IngestError>;

    /// Elements `start..=stop` of the list (`stop` is clamped to the end).
    async fn range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, IngestError>;

    /// Length of the list at `key`; 0 if absent.
    async fn len(&self, key: &str) -> Result<usize, IngestError>;

    async fn get(&self, key: &str) -> Result<Option<String>, IngestError>;

    /// Set a string value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), IngestError>;

    /// Attach an expiration to an existing key. Returns `false` if absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, IngestError>;

    async fn exists(&self, key: &str) -> Result<bool, IngestError>;

    /// Delete a key of any kind. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, IngestError>;
}

// ─── In-memory backend ────────────────────────────────────────────────────────

enum Value {
    Str(String),
    List(VecDeque<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache backend. Expired keys are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the map, first dropping `key` if it has expired. Other keys are
    /// left alone until something touches them.
    fn lock(&self, key: &str) -> Result<MutexGuard<'_, HashMap<String, Entry>>, IngestError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| IngestError::Cache("memory backend lock poisoned".into()))?;
        if guard.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
            guard.remove(key);
        }
        Ok(guard)
    }

    fn with_list<T>(
        &self,
        key: &str,
        create: bool,
        f: impl FnOnce(&mut VecDeque<String>) -> T,
    ) -> Result<Option<T>, IngestError> {
        let mut entries = self.lock(key)?;
        if create && !entries.contains_key(key) {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(VecDeque::new()),
                    expires_at: None,
                },
            );
        }
        let (out, emptied) = match entries.get_mut(key) {
            None => return Ok(None),
            Some(Entry { value: Value::List(list), .. }) => {
                let out = f(list);
                (out, list.is_empty())
            }
            Some(_) => return Err(wrong_type(key)),
        };
        if emptied {
            entries.remove(key);
        }
        Ok(Some(out))
    }
}

fn wrong_type(key: &str) -> IngestError {
    IngestError::Cache(format!("WRONGTYPE operation against key '{key}'"))
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn push_front(&self, key: &str, value: String) -> Result<usize, IngestError> {
        Ok(self
            .with_list(key, true, |l| {
                l.push_front(value);
                l.len()
            })?
            .unwrap_or(0))
    }

    async fn push_back(&self, key: &str, value: String) -> Result<usize, IngestError> {
        Ok(self
            .with_list(key, true, |l| {
                l.push_back(value);
                l.len()
            })?
            .unwrap_or(0))
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, IngestError> {
        Ok(self.with_list(key, false, |l| l.pop_front())?.flatten())
    }

    async fn pop_back(&self, key: &str) -> Result<Option<String>, IngestError> {
        Ok(self.with_list(key, false, |l| l.pop_back())?.flatten())
    }

    async fn set_index(&self, key: &str, index: usize, value: String) -> Result<(), IngestError> {
        let replaced = self.with_list(key, false, |l| match l.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        })?;
        match replaced {
            Some(true) => Ok(()),
            _ => Err(IngestError::Cache(format!("index {index} out of range for '{key}'"))),
        }
    }

    async fn range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, IngestError> {
        Ok(self
            .with_list(key, false, |l| {
                l.iter()
                    .skip(start)
                    .take(stop.saturating_sub(start).saturating_add(1))
                    .cloned()
                    .collect()
            })?
            .unwrap_or_default())
    }

    async fn len(&self, key: &str) -> Result<usize, IngestError> {
        Ok(self.with_list(key, false, |l| l.len())?.unwrap_or(0))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, IngestError> {
        match self.lock(key)?.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Str(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), IngestError> {
        self.lock(key)?.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, IngestError> {
        match self.lock(key)?.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, IngestError> {
        Ok(self.lock(key)?.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, IngestError> {
        Ok(self.lock(key)?.remove(key).is_some())
    }
}
