//! ChainIngest CLI — runs the ingestion engine against an EVM node.
//!
//! # Commands
//! ```text
//! chainingest run     --rpc-url <url> [--config <file.json>] [--db <file.sqlite>]
//! chainingest config  [--config <file.json>]
//! chainingest info
//! chainingest version
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use chainingest_core::{BlockStore, EngineConfig, MemoryCacheBackend};
use chainingest_engine::EngineBuilder;
use chainingest_evm::{EvmNodeClient, HttpClientConfig};
use tokio_util::sync::CancellationToken;

mod logging;

#[derive(Parser)]
#[command(
    name = "chainingest",
    about = "Block ingestion engine for blockchain explorers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the chain, backfill history and verify stored blocks until Ctrl-C
    Run {
        /// JSON-RPC endpoint of the node
        #[arg(long)]
        rpc_url: String,
        /// JSON config file; missing fields take their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// SQLite database file (requires the `sqlite` feature)
        #[arg(long)]
        db: Option<String>,
        /// Initial watermark when the store is empty
        #[arg(long)]
        start_height: Option<u64>,
        /// Lowest height backfill walks down to
        #[arg(long)]
        backfill_floor: Option<u64>,
        /// Global log level
        #[arg(long)]
        log_level: Option<String>,
        /// Emit JSON logs
        #[arg(long)]
        json_logs: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show version and build features
    Info,

    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            rpc_url,
            config,
            db,
            start_height,
            backfill_floor,
            log_level,
            json_logs,
        } => {
            let mut cfg = load_config(config.as_ref())?;
            if start_height.is_some() {
                cfg.start_height = start_height;
            }
            if let Some(floor) = backfill_floor {
                cfg.backfill_floor = floor;
            }
            if let Some(level) = log_level {
                cfg.log.level = level;
            }
            cfg.log.json |= json_logs;
            cfg.validate()?;
            cmd_run(&rpc_url, cfg, db.as_deref()).await
        }

        Commands::Config { config } => {
            let cfg = load_config(config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }

        Commands::Info => cmd_info(),

        Commands::Version => {
            println!("chainingest {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    EngineConfig::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(rpc_url: &str, cfg: EngineConfig, db: Option<&str>) -> Result<()> {
    logging::init_tracing(&cfg.log);

    let node = EvmNodeClient::new(rpc_url, HttpClientConfig::default())
        .context("cannot create RPC client")?;
    let store = open_store(db).await?;

    let engine = EngineBuilder::from_config(cfg)
        .build(Arc::new(node), store, Arc::new(MemoryCacheBackend::new()))?;
    let metrics = engine.metrics();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            return;
        }
        tracing::info!("Interrupt received, shutting down after current ticks");
        on_signal.cancel();
    });

    engine.run(cancel).await?;

    let m = metrics.snapshot();
    println!("Imported {} blocks", m.blocks_imported);
    if let Some(avg) = m.average_import_time() {
        println!("Average import time: {avg:?}");
    }
    println!("Repairs: {}  Requeues: {}  Gaps: {}", m.repairs, m.requeues, m.gaps_detected);
    if m.persistent_errors > 0 {
        println!("Persistent errors: {}", m.persistent_errors);
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store(db: Option<&str>) -> Result<Arc<dyn BlockStore>> {
    use chainingest_storage::sqlite::SqliteBlockStore;

    match db {
        Some(path) => {
            let store = SqliteBlockStore::open(path)
                .await
                .with_context(|| format!("cannot open database {path}"))?;
            tracing::info!(path, "Using SQLite store");
            Ok(Arc::new(store))
        }
        None => Ok(memory_store()),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(db: Option<&str>) -> Result<Arc<dyn BlockStore>> {
    if db.is_some() {
        anyhow::bail!("--db needs a build with the `sqlite` feature");
    }
    Ok(memory_store())
}

fn memory_store() -> Arc<dyn BlockStore> {
    tracing::warn!("No database configured, blocks are kept in memory only");
    Arc::new(chainingest_storage::InMemoryBlockStore::new())
}

fn cmd_info() -> Result<()> {
    println!("ChainIngest v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Tasks:");
    println!("  listener   follows the chain tip, queues gaps");
    println!("  backfill   walks history backwards, repairs mismatches");
    println!("  verifier   re-checks recent blocks, drains the error queue");
    println!();
    println!("Stores:");
    println!("  memory     always available");
    if cfg!(feature = "sqlite") {
        println!("  sqlite     enabled (--db <file>)");
    } else {
        println!("  sqlite     disabled (build with --features sqlite)");
    }
    Ok(())
}
