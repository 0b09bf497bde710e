//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::WindowConfig;
use crate::error::IngestError;

/// Configuration for an ingestion engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Listener polling interval (milliseconds).
    #[serde(default = "default_listener_interval_ms")]
    pub listener_interval_ms: u64,
    /// Pause between backfill steps (milliseconds).
    #[serde(default = "default_backfill_interval_ms")]
    pub backfill_interval_ms: u64,
    /// Verifier + error-recovery interval (milliseconds).
    #[serde(default = "default_verifier_interval_ms")]
    pub verifier_interval_ms: u64,
    /// Sleep after a transient backfill failure (milliseconds).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Number of blocks held in the cache window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Length of the cached "latest transactions" list.
    #[serde(default = "default_latest_txs_size")]
    pub latest_txs_size: usize,
    /// Expiration of per-block cache entries (seconds).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Failed recovery attempts before a height is moved to the
    /// persistent-error record.
    #[serde(default = "default_recovery_max_attempts")]
    pub recovery_max_attempts: u32,
    /// Lowest height the backfill walks down to (inclusive).
    #[serde(default)]
    pub backfill_floor: u64,
    /// Height the backfill starts from; `None` = latest network height.
    #[serde(default)]
    pub backfill_start: Option<u64>,
    /// Watermark used when the store is empty; `None` = one below the
    /// latest network height.
    #[serde(default)]
    pub start_height: Option<u64>,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_listener_interval_ms() -> u64 { 1_000 }
fn default_backfill_interval_ms() -> u64 { 100 }
fn default_verifier_interval_ms() -> u64 { 1_000 }
fn default_retry_delay_ms() -> u64 { 2_000 }
fn default_window_size() -> usize { 100 }
fn default_latest_txs_size() -> usize { 100 }
fn default_cache_ttl_secs() -> u64 { 3_600 }
fn default_recovery_max_attempts() -> u32 { 5 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listener_interval_ms: default_listener_interval_ms(),
            backfill_interval_ms: default_backfill_interval_ms(),
            verifier_interval_ms: default_verifier_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            window_size: default_window_size(),
            latest_txs_size: default_latest_txs_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            recovery_max_attempts: default_recovery_max_attempts(),
            backfill_floor: 0,
            backfill_start: None,
            start_height: None,
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, IngestError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.window_size == 0 {
            return Err(IngestError::Config("window_size must be > 0".into()));
        }
        if self.latest_txs_size == 0 {
            return Err(IngestError::Config("latest_txs_size must be > 0".into()));
        }
        if self.recovery_max_attempts == 0 {
            return Err(IngestError::Config("recovery_max_attempts must be > 0".into()));
        }
        if self.listener_interval_ms == 0
            || self.backfill_interval_ms == 0
            || self.verifier_interval_ms == 0
        {
            return Err(IngestError::Config("tick intervals must be > 0".into()));
        }
        if let Some(start) = self.backfill_start {
            if start < self.backfill_floor {
                return Err(IngestError::Config(format!(
                    "backfill_start {start} is below backfill_floor {}",
                    self.backfill_floor
                )));
            }
        }
        Ok(())
    }

    pub fn window(&self) -> WindowConfig {
        WindowConfig {
            capacity: self.window_size,
            latest_txs: self.latest_txs_size,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    pub fn listener_interval(&self) -> Duration {
        Duration::from_millis(self.listener_interval_ms)
    }

    pub fn backfill_interval(&self) -> Duration {
        Duration::from_millis(self.backfill_interval_ms)
    }

    pub fn verifier_interval(&self) -> Duration {
        Duration::from_millis(self.verifier_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive string, e.g. `"info,chainingest_engine=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}
