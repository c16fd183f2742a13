//! # Local Database Module
//!
//! The durable local store shared by the foreground client and the background
//! worker. It is the single source of truth for sync: neither context keeps
//! authoritative state in memory, and cross-context messages only tell the
//! other side to re-read from here.
//!
//! ## Layout
//!
//! - `tasks` - cached task records keyed by id, indexed by project and sync state
//! - `pending_actions` - the mutation queue, keyed by an auto-incrementing sequence
//! - `rejected_actions` - actions the server refused with a client error
//! - `cache_namespaces` / `cache_entries` - request/response pairs of the
//!   interception layer, grouped in versioned namespaces
//!
//! ## Key Components
//!
//! - `schema.rs`: Versioned migrations
//! - `tasks.rs`: Cached task records
//! - `queue.rs`: Pending and rejected actions, optimistic writes, reconciliation
//! - `cache.rs`: Cache namespaces
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskapp_sync::local_db::LocalDatabase;
//! use taskapp_sync::shared::{CachedTask, NewAction, EntityKind, TaskFields};
//!
//! # async fn example() -> taskapp_sync::shared::Result<()> {
//! let db = LocalDatabase::open("/tmp/taskapp.db", 3).await?;
//!
//! let task = CachedTask::new_local(TaskFields::named("Draft brief"));
//! let action = NewAction::create(EntityKind::Task, task.create_payload());
//! db.record_optimistic_put(&task, action).await?;
//!
//! for action in db.drain_queue_snapshot().await? {
//!     // replay...
//!     db.remove_action(action.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod queue;
pub mod schema;
pub mod tasks;

use crate::shared::config::{SyncConfig, CURRENT_SCHEMA_VERSION};
use crate::shared::error::{Result, SyncError};
use schema::MIGRATIONS;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;

/// Local database connection manager
///
/// Every public operation is atomic with respect to the record or queue entry
/// it touches. Operations that must change several rows together (optimistic
/// writes, reconciliation, rejection) run in a single transaction.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
    version: u32,
}

impl LocalDatabase {
    /// Open or create the store at `path` with the declared schema `version`
    ///
    /// Migrations newer than the stored version and not newer than `version`
    /// are applied. Asking for a version older than the one on disk fails
    /// with [`SyncError::SchemaDowngrade`].
    pub async fn open(path: impl AsRef<Path>, version: u32) -> Result<Self> {
        let path = path.as_ref();

        if version > CURRENT_SCHEMA_VERSION {
            return Err(SyncError::UnknownSchemaVersion {
                requested: version,
                latest: CURRENT_SCHEMA_VERSION,
            });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let mut db = Self { pool, version: 0 };
        db.version = db.run_migrations(version).await?;

        tracing::debug!(
            "[Store] Opened {} at schema version {}",
            path.display(),
            db.version
        );
        Ok(db)
    }

    /// Open the store named by the configuration
    pub async fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::open(&config.database_path, config.schema_version).await
    }

    /// Schema version currently applied
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Fail unless every table the sync layer writes to exists
    pub fn require_current(&self) -> Result<()> {
        if self.version < CURRENT_SCHEMA_VERSION {
            return Err(SyncError::SchemaOutdated {
                version: self.version,
                required: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self, requested: u32) -> Result<u32> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let (stored,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        let stored = stored as u32;

        if stored > requested {
            return Err(SyncError::SchemaDowngrade { stored, requested });
        }

        let mut current = stored;
        for migration in MIGRATIONS
            .iter()
            .filter(|m| m.version > stored && m.version <= requested)
        {
            let mut tx = self.pool.begin().await?;
            for statement in migration.statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(migration.version as i64)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(
                "[Store] Applied migration {} ({})",
                migration.version,
                migration.description
            );
            current = migration.version;
        }

        Ok(current)
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let (task_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        let (unsynced_tasks,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE sync_state = 'dirty'")
                .fetch_one(&self.pool)
                .await?;
        let (pending_actions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_actions")
            .fetch_one(&self.pool)
            .await?;
        let rejected_actions = if self.version >= 3 {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rejected_actions")
                .fetch_one(&self.pool)
                .await?;
            count
        } else {
            0
        };

        Ok(DatabaseStats {
            task_count: task_count as u64,
            unsynced_tasks: unsynced_tasks as u64,
            pending_actions: pending_actions as u64,
            rejected_actions: rejected_actions as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Cached task records
    pub task_count: u64,
    /// Tasks with local changes not yet confirmed
    pub unsynced_tasks: u64,
    /// Actions waiting in the queue
    pub pending_actions: u64,
    /// Actions the server refused
    pub rejected_actions: u64,
}
