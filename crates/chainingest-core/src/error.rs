//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting or reading blocks.
///
/// None of these are fatal to the engine: every failure degrades to a retry
/// on the next tick, a fall-through to the next read tier, or a repair.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("range [{skip}, {skip}+{limit}) exceeds cached length {len}")]
    OutOfRange { skip: usize, limit: usize, len: usize },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IngestError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Returns `true` if the entity is simply absent at this tier.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::OutOfRange { .. })
    }

    /// Returns `true` if the failure came from an I/O collaborator and is
    /// worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_) | Self::Cache(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(IngestError::not_found("block", 7).is_not_found());
        assert!(IngestError::OutOfRange { skip: 0, limit: 5, len: 2 }.is_not_found());
        assert!(IngestError::Rpc("timeout".into()).is_transient());
        assert!(!IngestError::Config("bad".into()).is_transient());
    }

    #[test]
    fn not_found_message() {
        let e = IngestError::not_found("block", "0xabc");
        assert_eq!(e.to_string(), "block not found: 0xabc");
    }
}
