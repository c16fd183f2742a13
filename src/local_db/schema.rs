//! Schema migrations
//!
//! Each version only creates what it introduces, with `IF NOT EXISTS`, so
//! opening an existing store at a higher version never touches data that is
//! already there.

/// A numbered set of statements applied in one transaction
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "tasks and pending actions",
        statements: &[
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                priority TEXT NOT NULL,
                due_date TEXT,
                assignee TEXT,
                project TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                completed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                sync_state TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks (project)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_sync_state ON tasks (sync_state)",
            "CREATE TABLE IF NOT EXISTS pending_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                entity TEXT NOT NULL,
                entity_id TEXT,
                data TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_pending_actions_timestamp ON pending_actions (timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_pending_actions_entity ON pending_actions (entity, entity_id)",
        ],
    },
    Migration {
        version: 2,
        description: "cache namespaces",
        statements: &[
            "CREATE TABLE IF NOT EXISTS cache_namespaces (
                name TEXT PRIMARY KEY NOT NULL,
                created_at INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                request_key TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, request_key)
            )",
        ],
    },
    Migration {
        version: 3,
        description: "rejected actions",
        statements: &[
            "CREATE TABLE IF NOT EXISTS rejected_actions (
                id INTEGER PRIMARY KEY NOT NULL,
                action TEXT NOT NULL,
                entity TEXT NOT NULL,
                entity_id TEXT,
                data TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                status INTEGER,
                reason TEXT NOT NULL,
                rejected_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_rejected_actions_entity ON rejected_actions (entity, entity_id)",
        ],
    },
];
