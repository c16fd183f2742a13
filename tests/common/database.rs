//! Local store fixtures
//!
//! Every fixture lives in its own temp directory so tests never share a
//! database file.

use taskapp_sync::local_db::LocalDatabase;
use taskapp_sync::shared::config::CURRENT_SCHEMA_VERSION;
use tempfile::TempDir;

/// A store in a fresh temp directory; keep the `TempDir` alive for the test
pub struct TestStore {
    pub dir: TempDir,
    pub db: LocalDatabase,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db = LocalDatabase::open(dir.path().join("local.db"), CURRENT_SCHEMA_VERSION)
            .await
            .expect("Failed to open local store");
        Self { dir, db }
    }

    /// Open the same file again, as a restarted process would
    pub async fn reopen(&self, version: u32) -> taskapp_sync::shared::Result<LocalDatabase> {
        LocalDatabase::open(self.dir.path().join("local.db"), version).await
    }
}
