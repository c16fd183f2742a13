//! # Offline Task Editing
//!
//! The foreground side of the sync layer. Every user mutation is applied to
//! the local store and enqueued in one transaction, so the view never shows
//! a change that was not safely recorded for replay.
//!
//! ## Key Components
//!
//! - `retry.rs`: Retry logic and backoff strategies
//! - `reconciliation.rs`: Temporary id handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskapp_sync::local_db::LocalDatabase;
//! use taskapp_sync::notifier::notifier_pair;
//! use taskapp_sync::offline::OfflineManager;
//! use taskapp_sync::shared::{TaskFields, TaskPatch};
//! use taskapp_sync::sync::NetworkMonitor;
//!
//! # async fn example(db: LocalDatabase) -> taskapp_sync::shared::Result<()> {
//! let (foreground, _worker) = notifier_pair();
//! let manager = OfflineManager::new(db, foreground, NetworkMonitor::default());
//!
//! let task = manager.create_task(TaskFields::named("Draft brief")).await?;
//! manager
//!     .update_task(&task.id, TaskPatch { completed: Some(true), ..TaskPatch::default() })
//!     .await?;
//!
//! let mut completions = manager.subscribe();
//! OfflineManager::wait_for_sync_complete(&mut completions).await;
//! let tasks = manager.tasks().await?;
//! # let _ = tasks;
//! # Ok(())
//! # }
//! ```

pub mod reconciliation;
pub mod retry;

pub use reconciliation::IdRemap;
pub use retry::{BackoffStrategy, RetryManager};

use crate::local_db::LocalDatabase;
use crate::notifier::ForegroundEndpoint;
use crate::shared::action::{EntityKind, NewAction, PendingAction, RejectedAction};
use crate::shared::error::{Result, SyncError};
use crate::shared::event::SyncMessage;
use crate::shared::task::{now_millis, CachedTask, SyncState, TaskFields, TaskPatch};
use crate::sync::NetworkMonitor;
use tokio::sync::broadcast;

/// Foreground coordinator for optimistic task edits
#[derive(Debug, Clone)]
pub struct OfflineManager {
    db: LocalDatabase,
    endpoint: ForegroundEndpoint,
    monitor: NetworkMonitor,
    /// Tag to register on reconnect when the platform supports background sync
    background_sync_tag: Option<String>,
}

impl OfflineManager {
    pub fn new(db: LocalDatabase, endpoint: ForegroundEndpoint, monitor: NetworkMonitor) -> Self {
        Self {
            db,
            endpoint,
            monitor,
            background_sync_tag: None,
        }
    }

    /// Prefer a background-sync registration over `TRIGGER_SYNC` on reconnect
    pub fn with_background_sync(mut self, tag: impl Into<String>) -> Self {
        self.background_sync_tag = Some(tag.into());
        self
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Create a task under a temporary id
    pub async fn create_task(&self, fields: TaskFields) -> Result<CachedTask> {
        let task = CachedTask::new_local(fields);
        let action = NewAction::create(EntityKind::Task, task.create_payload());
        self.db.record_optimistic_put(&task, action).await?;
        tracing::debug!("[Sync] Created task {} locally", task.id);

        self.nudge();
        Ok(task)
    }

    /// Apply a partial update and queue it
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<CachedTask> {
        let mut task = self
            .db
            .get_task(id)
            .await?
            .ok_or_else(|| SyncError::not_found("task", id))?;

        task.fields.apply(&patch);
        task.updated_at = task.updated_at.max(now_millis());
        task.sync_state = SyncState::Dirty;

        let action = NewAction::update(EntityKind::Task, id, serde_json::to_value(&patch)?);
        self.db.record_optimistic_put(&task, action).await?;

        self.nudge();
        Ok(task)
    }

    /// Remove a task locally and queue the delete
    pub async fn delete_task(&self, id: &str) -> Result<PendingAction> {
        let pending = self
            .db
            .record_optimistic_delete(id, NewAction::delete(EntityKind::Task, id))
            .await?;

        self.nudge();
        Ok(pending)
    }

    pub async fn tasks(&self) -> Result<Vec<CachedTask>> {
        self.db.get_all_tasks().await
    }

    pub async fn tasks_by_project(&self, project: &str) -> Result<Vec<CachedTask>> {
        self.db.tasks_by_project(project).await
    }

    /// Mutations not yet confirmed by the server
    pub async fn pending_count(&self) -> Result<u64> {
        self.db.count_pending_actions().await
    }

    pub async fn rejected_actions(&self) -> Result<Vec<RejectedAction>> {
        self.db.rejected_actions().await
    }

    /// Give up on a refused change
    pub async fn discard_rejected(&self, id: i64) -> Result<()> {
        self.db.discard_rejected(id).await
    }

    /// Queue a refused change again, at the tail
    pub async fn resubmit_rejected(&self, id: i64) -> Result<PendingAction> {
        let pending = self.db.resubmit_rejected(id).await?;
        self.nudge();
        Ok(pending)
    }

    /// Ask the worker to drain now
    pub fn request_sync(&self) -> bool {
        self.endpoint.post(SyncMessage::TriggerSync)
    }

    /// Feed a platform online/offline event
    ///
    /// On reconnect the worker is asked to drain, through a background-sync
    /// registration when one is configured, otherwise with `TRIGGER_SYNC`.
    /// Returns whether this was a reconnect.
    pub fn set_online(&self, online: bool) -> bool {
        let restored = self.monitor.set_online(online);
        if restored {
            let delivered = match &self.background_sync_tag {
                Some(tag) => self.endpoint.register_background_sync(tag),
                None => self.request_sync(),
            };
            if !delivered {
                tracing::debug!("[Sync] Worker not reachable, relying on its own connectivity check");
            }
        }
        restored
    }

    /// Receive `SYNC_COMPLETE` from the worker
    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.endpoint.subscribe()
    }

    /// Wait until the worker reports a finished pass
    ///
    /// Returns false if the worker is gone. Missing some messages to lag
    /// still counts as complete since the caller re-reads the store anyway.
    pub async fn wait_for_sync_complete(completions: &mut broadcast::Receiver<SyncMessage>) -> bool {
        loop {
            match completions.recv().await {
                Ok(SyncMessage::SyncComplete) => return true,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return true,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }

    /// Try the queue right away when online; offline edits wait for reconnect
    fn nudge(&self) {
        if self.monitor.is_online() {
            self.request_sync();
        }
    }
}
