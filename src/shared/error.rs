//! Error Types
//!
//! Errors surfaced by the sync layer.
//!
//! # Error Categories
//!
//! - `SyncError` - store, serialization, configuration and transport failures
//!   raised to the caller of a store or engine operation
//! - `TransportError` - a request that never produced an HTTP response
//!
//! Per-item replay failures inside a drain pass are not errors at this level;
//! they are classified into a [`crate::sync::ReplayOutcome`] and never abort
//! the pass.
use crate::shared::config::ConfigError;
use thiserror::Error;

/// Result type alias for sync layer operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the local store, the engine and the worker lifecycle
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local database error (quota, corruption, I/O)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// JSON serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The network could not be reached
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The store on disk is newer than the version requested
    #[error("Schema downgrade: store is at version {stored}, requested {requested}")]
    SchemaDowngrade {
        /// Version recorded in the store
        stored: u32,
        /// Version the caller asked to open
        requested: u32,
    },

    /// The store is older than the sync layer needs
    #[error("Schema too old: store is at version {version}, version {required} is required")]
    SchemaOutdated {
        /// Version the store was opened at
        version: u32,
        /// Version the caller needs
        required: u32,
    },

    /// No migration exists for the requested version
    #[error("Unknown schema version {requested}, latest is {latest}")]
    UnknownSchemaVersion {
        /// Version the caller asked to open
        requested: u32,
        /// Newest version this build can create
        latest: u32,
    },

    /// A stored row could not be decoded into a record
    #[error("Corrupt record in {table}: {message}")]
    CorruptRecord {
        /// Table the row was read from
        table: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// A record the caller referred to does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Installing the static cache failed
    #[error("Install failed: {message}")]
    Install {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            table,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn install(message: impl Into<String>) -> Self {
        Self::Install {
            message: message.into(),
        }
    }
}

/// A request that failed before any HTTP status was received
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network unreachable, connection refused or reset
    #[error("Network error: {0}")]
    Network(String),

    /// The transport gave up waiting
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
