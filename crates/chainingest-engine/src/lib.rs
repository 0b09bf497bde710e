//! chainingest-engine — the three driver loops that keep a block store in
//! step with the chain.
//!
//! - [`Listener`]: follows the tip, advances the watermark, detects gaps.
//! - [`Backfill`]: walks history backwards, repairing blocks that fail the
//!   validation predicate, then starts again from the tip.
//! - [`Verifier`]: re-checks recently imported heights against the node.
//! - [`ErrorRecovery`]: imports heights from the error queue, promoting
//!   repeat failures to the persistent-error record.
//!
//! [`IngestEngine`] runs them as independent Tokio tasks sharing one cache,
//! store and node client.

pub mod backfill;
pub mod builder;
pub mod engine;
pub mod importer;
pub mod listener;
pub mod reader;
pub mod recovery;
pub mod verifier;

#[cfg(test)]
mod testkit;

pub use backfill::{Backfill, BackfillStep};
pub use builder::EngineBuilder;
pub use engine::IngestEngine;
pub use importer::{ImportOutcome, Importer};
pub use listener::{Listener, ListenerTick};
pub use reader::{BlockKey, ExplorerReader, TxQuery};
pub use recovery::{ErrorRecovery, RecoveryOutcome};
pub use verifier::{Verifier, VerifyOutcome};
