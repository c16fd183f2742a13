//! TaskApp Sync - Offline-First Synchronization Layer
//!
//! The sync layer behind a task-management client: a background worker
//! that intercepts requests, serves cached content, queues mutations made
//! while offline, and replays them against the server when connectivity
//! returns, replacing client-generated temporary ids with the ids the
//! server assigns.
//!
//! # Module Structure
//!
//! - **`shared`** - Types used by both contexts
//!   - Task records, pending actions, cross-context messages
//!   - Error types and configuration
//!
//! - **`local_db`** - Durable local store (SQLite)
//!   - Cached tasks, the mutation queue, rejected actions
//!   - Versioned cache namespaces
//!
//! - **`network`** - Requests, responses and the `Transport` seam
//!   - `reqwest` transport
//!   - Interception layer (cache first / network first)
//!
//! - **`offline`** - Foreground side
//!   - Optimistic edits, retry policy, id reconciliation
//!
//! - **`sync`** - Background side
//!   - Drain pass, connectivity monitor, long-running service
//!
//! - **`notifier`** - `TRIGGER_SYNC` / `SYNC_COMPLETE` channels
//!
//! - **`worker`** - Worker lifecycle (install, activate, fetch, message,
//!   background sync)
//!
//! # Feature Flags
//!
//! - **`worker`** (default) - builds the `taskapp-sync-worker` binary with
//!   `tracing-subscriber` and `.env` loading
//!
//! # Consistency
//!
//! The local store is the single source of truth. Neither context keeps
//! authoritative state in memory; messages only tell the other side to
//! re-read it. Between devices the policy is last-write-wins by server-side
//! timestamp.
//!
//! # Error Handling
//!
//! - Store and enqueue failures propagate as [`shared::SyncError`]
//! - Replay failures are classified per entry and never abort a drain pass
//! - Cache failures in the interception layer degrade to a cache miss

/// Shared types and data structures
pub mod shared;

/// Durable local store
pub mod local_db;

/// Requests, transports and the interception layer
pub mod network;

/// Foreground offline editing
pub mod offline;

/// Background sync
pub mod sync;

/// Cross-context messaging
pub mod notifier;

/// Background worker lifecycle
pub mod worker;
