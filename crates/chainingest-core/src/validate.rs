//! Predicates deciding whether a persisted block must be repaired.

use crate::types::Block;

/// Compares a stored block with its network counterpart.
///
/// Returns `true` when the stored copy is acceptable, `false` when it must be
/// deleted and re-imported.
pub trait BlockValidator: Send + Sync {
    fn is_valid(&self, stored: &Block, network: &Block) -> bool;
}

/// Default predicate: the stored hash must equal the network hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashMatch;

impl BlockValidator for HashMatch {
    fn is_valid(&self, stored: &Block, network: &Block) -> bool {
        stored.hash.eq_ignore_ascii_case(&network.hash)
    }
}

/// Strict predicate: the stored block, transactions included, must equal the
/// network block.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullMatch;

impl BlockValidator for FullMatch {
    fn is_valid(&self, stored: &Block, network: &Block) -> bool {
        stored == network
    }
}

impl<F> BlockValidator for F
where
    F: Fn(&Block, &Block) -> bool + Send + Sync,
{
    fn is_valid(&self, stored: &Block, network: &Block) -> bool {
        self(stored, network)
    }
}
