//! # Local Database Module
//!
//! Durable local storage for queued mutations, backed by SQLite through
//! `sqlx`. Records survive process restarts and the absence of network.
//!
//! ## Architecture
//!
//! - **Lazy startup**: constructing a `LocalDatabase` does no I/O. The pool
//!   connects on first use and the schema is installed exactly once, the
//!   first time any operation runs.
//! - **Mutation queue**: one table keyed by mutation id, with secondary
//!   indexes on type, status and creation time (see `queue.rs`).
//! - **Migrations**: a `schema_migrations` table records which schema
//!   versions have been applied (see `schema.rs`).
//!
//! All operations are `async` and never block the caller's task on disk I/O.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use propsync::client::local_db::LocalDatabase;
//! use propsync::shared::{MutationType, QueuedMutation};
//!
//! # async fn example() -> Result<(), propsync::client::local_db::StoreError> {
//! let db = LocalDatabase::open("/tmp/propsync/queue.db");
//! let mutation = QueuedMutation::new(MutationType::ChatMessage, serde_json::json!({"text": "hi"}));
//! db.put(&mutation).await?;
//! assert_eq!(db.count_unsynced().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::shared::MutationId;

pub use queue::{MutationPatch, QueueStats, RecoveryReport, RetryBatch};

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local persistence is unavailable, or the write was refused
    /// (including a duplicate id).
    #[error("storage fault: {0}")]
    StorageFault(#[from] sqlx::Error),

    /// No record with this id.
    #[error("mutation {id} not found")]
    NotFound { id: MutationId },

    /// A stored row could not be decoded.
    #[error("corrupt queue row {id}: {message}")]
    Corrupt { id: String, message: String },

    /// The payload could not be encoded or decoded as JSON.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn corrupt(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageFault(sqlx::Error::Io(err))
    }
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

/// Local database connection manager
///
/// Owns the SQLite pool for the mutation queue. Cheap to share behind an
/// `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct LocalDatabase {
    pool: SqlitePool,
    location: StoreLocation,
    ready: OnceCell<()>,
}

impl LocalDatabase {
    /// Open (lazily) a database file at `path`.
    ///
    /// The file and its parent directory are created on first use. WAL mode
    /// is enabled for durability without blocking readers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_lazy_with(options);

        Self {
            pool,
            location: StoreLocation::File(path),
            ready: OnceCell::new(),
        }
    }

    /// Open a private in-memory database.
    ///
    /// A single connection is kept alive for the lifetime of the pool, since
    /// every SQLite in-memory connection is its own database.
    pub fn in_memory() -> Self {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(options);

        Self {
            pool,
            location: StoreLocation::InMemory,
            ready: OnceCell::new(),
        }
    }

    /// Where this database lives.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Pool reference, installing the schema on first call.
    pub(crate) async fn pool(&self) -> Result<&SqlitePool> {
        self.ready.get_or_try_init(|| self.init_schema()).await?;
        Ok(&self.pool)
    }

    /// Initialize database schema
    ///
    /// Creates the storage directory if needed and runs pending migrations.
    async fn init_schema(&self) -> Result<()> {
        if let StoreLocation::File(path) = &self.location {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        self.run_migrations().await?;
        tracing::debug!("Local queue database ready at {:?}", self.location);
        Ok(())
    }

    /// Run database migrations
    ///
    /// Checks the current schema version and applies any pending migrations,
    /// each inside its own transaction.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(schema::CREATE_MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await?;

        let current_version: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if !schema::needs_migration(current_version.0) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version.0) {
            let mut tx = self.pool.begin().await?;
            for statement in schema::migration_statements(version) {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!("Applied local queue schema migration {}", version);
        }

        Ok(())
    }

    /// Current schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<i64> {
        let pool = self.pool().await?;
        let version: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(pool)
                .await?;
        Ok(version.0)
    }

    /// Close the pool. Later operations fail with `StorageFault`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
