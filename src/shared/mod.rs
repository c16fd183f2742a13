//! Shared Module
//!
//! Types used by both execution contexts: the foreground client and the
//! background worker. Neither context holds authoritative state in memory;
//! these types describe what both read from and write to the local store.

/// Cached task records
pub mod task;

/// Queued mutations
pub mod action;

/// Cross-context messages
pub mod event;

/// Error types
pub mod error;

/// Sync layer configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use action::{ActionKind, EntityKind, NewAction, PendingAction, RejectedAction};
pub use config::{BackoffConfig, BackoffKind, ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{Result, SyncError, TransportError};
pub use event::SyncMessage;
pub use task::{Assignee, CachedTask, Priority, SyncState, TaskFields, TaskPatch};
