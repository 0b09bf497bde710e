//! SQLite block store.
//!
//! Persists blocks and their transactions (receipt fields merged, logs as
//! JSON) to a single SQLite file. Uses `sqlx` with WAL mode for concurrent
//! read performance.
//!
//! # Usage
//! ```rust,no_run
//! use chainingest_storage::sqlite::SqliteBlockStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteBlockStore::open("./blocks.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteBlockStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainingest_core::error::IngestError;
use chainingest_core::store::BlockStore;
use chainingest_core::types::{Block, Log, Page, Transaction};

const BLOCK_COLUMNS: &str =
    "number, hash, parent_hash, miner, timestamp, gas_used, gas_limit, tx_count";

const TX_COLUMNS: &str = "hash, block_number, block_hash, tx_index, from_addr, to_addr, value, \
     gas, gas_price, nonce, input, status, gas_used, logs_json";

fn storage_err(e: sqlx::Error) -> IngestError {
    IngestError::Storage(e.to_string())
}

/// SQLite-backed block store.
pub struct SqliteBlockStore {
    pool: SqlitePool,
}

impl SqliteBlockStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./blocks.db"`) or a full
    /// SQLite URL (`"sqlite:./blocks.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IngestError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// A single connection, since every connection to `:memory:` is its own
    /// database. All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, IngestError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IngestError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                number      INTEGER PRIMARY KEY,
                hash        TEXT    NOT NULL,
                parent_hash TEXT    NOT NULL,
                miner       TEXT    NOT NULL,
                timestamp   INTEGER NOT NULL,
                gas_used    INTEGER NOT NULL,
                gas_limit   INTEGER NOT NULL,
                tx_count    INTEGER NOT NULL,
                imported_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                hash         TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                tx_index     INTEGER NOT NULL,
                from_addr    TEXT    NOT NULL,
                to_addr      TEXT,
                value        TEXT    NOT NULL,
                gas          INTEGER NOT NULL,
                gas_price    INTEGER NOT NULL,
                nonce        INTEGER NOT NULL,
                input        TEXT    NOT NULL,
                status       INTEGER,
                gas_used     INTEGER,
                logs_json    TEXT    NOT NULL,
                PRIMARY KEY (block_number, tx_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_blocks_hash ON blocks (hash);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_txs_hash ON transactions (hash);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    async fn txs_of(&self, height: u64) -> Result<Vec<Transaction>, IngestError> {
        let rows = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE block_number = ? ORDER BY tx_index"
        ))
        .bind(height as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(tx_from_row).collect()
    }

    async fn full_block(&self, row: Option<SqliteRow>) -> Result<Option<Block>, IngestError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut block = block_from_row(&row);
        block.transactions = self.txs_of(block.number).await?;
        Ok(Some(block))
    }

    async fn height_of(&self, hash: &str) -> Result<Option<u64>, IngestError> {
        let row = sqlx::query("SELECT number FROM blocks WHERE hash = ? COLLATE NOCASE")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(|r| r.get::<i64, _>("number") as u64))
    }
}

fn block_from_row(row: &SqliteRow) -> Block {
    Block {
        number: row.get::<i64, _>("number") as u64,
        hash: row.get("hash"),
        parent_hash: row.get("parent_hash"),
        miner: row.get("miner"),
        timestamp: row.get("timestamp"),
        gas_used: row.get::<i64, _>("gas_used") as u64,
        gas_limit: row.get::<i64, _>("gas_limit") as u64,
        tx_count: row.get::<i64, _>("tx_count") as u32,
        transactions: Vec::new(),
    }
}

fn tx_from_row(row: &SqliteRow) -> Result<Transaction, IngestError> {
    let logs_json: String = row.get("logs_json");
    let logs: Vec<Log> = serde_json::from_str(&logs_json)?;
    Ok(Transaction {
        hash: row.get("hash"),
        block_number: row.get::<i64, _>("block_number") as u64,
        block_hash: row.get("block_hash"),
        index: row.get::<i64, _>("tx_index") as u32,
        from: row.get("from_addr"),
        to: row.get("to_addr"),
        value: row.get("value"),
        gas: row.get::<i64, _>("gas") as u64,
        gas_price: row.get::<i64, _>("gas_price") as u64,
        nonce: row.get::<i64, _>("nonce") as u64,
        input: row.get("input"),
        status: row.get::<Option<i64>, _>("status").map(|s| s as u64),
        gas_used: row.get::<Option<i64>, _>("gas_used").map(|g| g as u64),
        logs,
    })
}

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn exists(&self, height: u64) -> Result<bool, IngestError> {
        let row = sqlx::query("SELECT 1 FROM blocks WHERE number = ?")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.is_some())
    }

    async fn insert(&self, block: &Block) -> Result<(), IngestError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(&format!(
            "INSERT INTO blocks ({BLOCK_COLUMNS}, imported_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(block.number as i64)
        .bind(&block.hash)
        .bind(&block.parent_hash)
        .bind(&block.miner)
        .bind(block.timestamp)
        .bind(block.gas_used as i64)
        .bind(block.gas_limit as i64)
        .bind(block.tx_count as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        for t in &block.transactions {
            let logs = serde_json::to_string(&t.logs)?;
            sqlx::query(&format!(
                "INSERT INTO transactions ({TX_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&t.hash)
            .bind(t.block_number as i64)
            .bind(&t.block_hash)
            .bind(t.index as i64)
            .bind(&t.from)
            .bind(&t.to)
            .bind(&t.value)
            .bind(t.gas as i64)
            .bind(t.gas_price as i64)
            .bind(t.nonce as i64)
            .bind(&t.input)
            .bind(t.status.map(|s| s as i64))
            .bind(t.gas_used.map(|g| g as i64))
            .bind(&logs)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(height = block.number, txs = block.transactions.len(), "block stored");
        Ok(())
    }

    async fn delete(&self, height: u64) -> Result<(), IngestError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        sqlx::query("DELETE FROM transactions WHERE block_number = ?")
            .bind(height as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM blocks WHERE number = ?")
            .bind(height as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        debug!(height, "block deleted");
        Ok(())
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IngestError> {
        let row = sqlx::query(&format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE number = ?"))
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        self.full_block(row).await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IngestError> {
        let row = sqlx::query(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE hash = ? COLLATE NOCASE"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        self.full_block(row).await
    }

    async fn txs_by_block_height(
        &self,
        height: u64,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        if !self.exists(height).await? {
            return Err(IngestError::not_found("block", height));
        }
        let rows = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE block_number = ?
             ORDER BY tx_index LIMIT ? OFFSET ?"
        ))
        .bind(height as i64)
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(tx_from_row).collect()
    }

    async fn txs_by_block_hash(
        &self,
        hash: &str,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        let height = self
            .height_of(hash)
            .await?
            .ok_or_else(|| IngestError::not_found("block", hash))?;
        self.txs_by_block_height(height, page).await
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Option<Transaction>, IngestError> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE hash = ? COLLATE NOCASE LIMIT 1"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(tx_from_row).transpose()
    }

    async fn latest_blocks(&self, page: Page) -> Result<Vec<Block>, IngestError> {
        let rows = sqlx::query(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY number DESC LIMIT ? OFFSET ?"
        ))
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.iter().map(block_from_row).collect())
    }

    async fn latest_transactions(&self, page: Page) -> Result<Vec<Transaction>, IngestError> {
        let rows = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions
             ORDER BY block_number DESC, tx_index DESC LIMIT ? OFFSET ?"
        ))
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(tx_from_row).collect()
    }

    async fn latest_height(&self) -> Result<Option<u64>, IngestError> {
        let row = sqlx::query("SELECT MAX(number) AS max_number FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row
            .get::<Option<i64>, _>("max_number")
            .map(|n| n as u64))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
