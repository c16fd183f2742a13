//! # Background Sync Service
//!
//! The worker side of the sync layer: the [`SyncEngine`] that drains the
//! queue, the [`NetworkMonitor`] that reports connectivity, and the
//! long-running [`SyncService`] that decides when to drain.
//!
//! ## Triggers
//!
//! - `TRIGGER_SYNC` from any foreground context
//! - a platform background-sync callback for the configured tag
//! - an offline to online transition
//! - the poll timer, while online (the only trigger that honours backoff)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskapp_sync::local_db::LocalDatabase;
//! use taskapp_sync::network::HttpTransport;
//! use taskapp_sync::notifier::notifier_pair;
//! use taskapp_sync::shared::SyncConfig;
//! use taskapp_sync::sync::{NetworkMonitor, SyncEngine, SyncService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::from_env()?;
//! let db = LocalDatabase::from_config(&config).await?;
//! let (foreground, worker) = notifier_pair();
//! let (inbox, broadcaster) = worker.into_parts();
//!
//! let engine = Arc::new(SyncEngine::new(
//!     db,
//!     HttpTransport::from_config(&config)?,
//!     &config,
//!     broadcaster,
//! )?);
//! let service = SyncService::spawn(engine, inbox, NetworkMonitor::default(), &config);
//! # let _ = foreground;
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod network_monitor;

pub use engine::{DrainReport, DrainTrigger, ReplayOutcome, SyncEngine};
pub use network_monitor::{NetworkMonitor, NetworkStatus};

use crate::network::Transport;
use crate::notifier::{WorkerEvent, WorkerInbox};
use crate::shared::config::SyncConfig;
use crate::shared::event::SyncMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The drain a foreground message asks for, if any
pub fn trigger_for_message(message: SyncMessage) -> Option<DrainTrigger> {
    match message {
        SyncMessage::TriggerSync => Some(DrainTrigger::Requested),
        SyncMessage::SyncComplete => None,
    }
}

/// The drain a background-sync callback asks for, if the tag is ours
pub fn trigger_for_tag(tag: &str, sync_tag: &str) -> Option<DrainTrigger> {
    (tag == sync_tag).then_some(DrainTrigger::BackgroundSync)
}

/// Handle to the spawned sync loop
#[derive(Debug)]
pub struct SyncService {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncService {
    /// Start the loop on the current runtime
    pub fn spawn<T>(
        engine: Arc<SyncEngine<T>>,
        inbox: WorkerInbox,
        monitor: NetworkMonitor,
        config: &SyncConfig,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let poll_interval = config.poll_interval();
        let sync_tag = config.sync_tag.clone();
        // Subscribe before returning so no transition after spawn is missed
        let connectivity = monitor.subscribe();

        let handle = tokio::spawn(async move {
            Self::run(
                engine,
                inbox,
                sync_tag,
                monitor,
                connectivity,
                poll_interval,
                shutdown_rx,
            )
            .await;
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the loop and wait for an in-flight pass to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("[Sync] Sync loop ended abnormally: {}", e);
            }
        }
    }

    async fn run<T: Transport>(
        engine: Arc<SyncEngine<T>>,
        mut inbox: WorkerInbox,
        sync_tag: String,
        monitor: NetworkMonitor,
        mut connectivity: watch::Receiver<NetworkStatus>,
        poll_interval: Duration,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let mut inbox_open = true;
        let mut monitor_open = true;

        tracing::info!("[Sync] Sync loop started (poll every {:?})", poll_interval);

        loop {
            let trigger = tokio::select! {
                _ = &mut shutdown_rx => break,
                event = inbox.recv(), if inbox_open => match event {
                    Some(WorkerEvent::Message(message)) => trigger_for_message(message),
                    Some(WorkerEvent::BackgroundSync(tag)) => {
                        let trigger = trigger_for_tag(&tag, &sync_tag);
                        if trigger.is_none() {
                            tracing::debug!("[Sync] Ignoring background sync for tag {}", tag);
                        }
                        trigger
                    }
                    None => {
                        tracing::debug!("[Sync] All foreground contexts are gone");
                        inbox_open = false;
                        None
                    }
                },
                changed = connectivity.changed(), if monitor_open => match changed {
                    Ok(()) => {
                        let status = *connectivity.borrow_and_update();
                        (status == NetworkStatus::Online).then_some(DrainTrigger::ConnectivityRestored)
                    }
                    Err(_) => {
                        monitor_open = false;
                        None
                    }
                },
                _ = ticker.tick() => monitor.is_online().then_some(DrainTrigger::Periodic),
            };

            if let Some(trigger) = trigger {
                if let Err(e) = engine.drain(trigger).await {
                    tracing::error!("[Sync] Sync failed: {}", e);
                }
            }
        }

        tracing::info!("[Sync] Sync loop stopped");
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_db::test_support::temp_db;
    use crate::network::test_support::MockTransport;
    use crate::network::HttpResponse;
    use crate::notifier::notifier_pair;
    use crate::shared::{CachedTask, EntityKind, NewAction, TaskFields};
    use reqwest::Method;

    #[test]
    fn test_trigger_mapping() {
        assert_eq!(
            trigger_for_message(SyncMessage::TriggerSync),
            Some(DrainTrigger::Requested)
        );
        assert_eq!(trigger_for_message(SyncMessage::SyncComplete), None);
        assert_eq!(
            trigger_for_tag("sync-tasks", "sync-tasks"),
            Some(DrainTrigger::BackgroundSync)
        );
        assert_eq!(trigger_for_tag("sync-photos", "sync-tasks"), None);
    }

    #[tokio::test]
    async fn test_trigger_message_drains_and_notifies() {
        let (_dir, db) = temp_db().await;
        let config = SyncConfig::builder()
            .server_url("http://localhost:3000")
            .poll_interval_secs(3600)
            .build()
            .unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::POST,
            "/api/tasks",
            Ok(HttpResponse::json_ok(&serde_json::json!({ "id": "srv-1" }))),
        );

        let (foreground, worker) = notifier_pair();
        let (inbox, broadcaster) = worker.into_parts();
        let engine = Arc::new(SyncEngine::new(db.clone(), Arc::clone(&mock), &config, broadcaster).unwrap());
        let service = SyncService::spawn(engine, inbox, NetworkMonitor::default(), &config);

        let task = CachedTask::new_local(TaskFields::named("Queued"));
        db.record_optimistic_put(&task, NewAction::create(EntityKind::Task, task.create_payload()))
            .await
            .unwrap();

        let mut completions = foreground.subscribe();
        assert!(foreground.post(SyncMessage::TriggerSync));
        assert_eq!(completions.recv().await.unwrap(), SyncMessage::SyncComplete);

        assert!(db.get_task("srv-1").await.unwrap().is_some());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_connectivity_restore_drains() {
        let (_dir, db) = temp_db().await;
        let config = SyncConfig::builder()
            .server_url("http://localhost:3000")
            .poll_interval_secs(3600)
            .build()
            .unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::DELETE, "/api/tasks/srv-1", Ok(HttpResponse::new(204, "")));

        let (foreground, worker) = notifier_pair();
        let (inbox, broadcaster) = worker.into_parts();
        let engine = Arc::new(SyncEngine::new(db.clone(), Arc::clone(&mock), &config, broadcaster).unwrap());
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let service = SyncService::spawn(engine, inbox, monitor.clone(), &config);

        db.record_optimistic_delete("srv-1", NewAction::delete(EntityKind::Task, "srv-1"))
            .await
            .unwrap();

        let mut completions = foreground.subscribe();
        monitor.set_online(true);
        assert_eq!(completions.recv().await.unwrap(), SyncMessage::SyncComplete);

        assert_eq!(db.count_pending_actions().await.unwrap(), 0);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_background_sync_registration_drains_only_for_its_tag() {
        let (_dir, db) = temp_db().await;
        let config = SyncConfig::builder()
            .server_url("http://localhost:3000")
            .poll_interval_secs(3600)
            .build()
            .unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::DELETE, "/api/tasks/srv-7", Ok(HttpResponse::new(204, "")));

        let (foreground, worker) = notifier_pair();
        let (inbox, broadcaster) = worker.into_parts();
        let engine = Arc::new(SyncEngine::new(db.clone(), Arc::clone(&mock), &config, broadcaster).unwrap());
        let service = SyncService::spawn(engine, inbox, NetworkMonitor::default(), &config);

        db.record_optimistic_delete("srv-7", NewAction::delete(EntityKind::Task, "srv-7"))
            .await
            .unwrap();

        let mut completions = foreground.subscribe();
        assert!(foreground.register_background_sync("sync-photos"));
        assert!(foreground.register_background_sync(&config.sync_tag));
        assert_eq!(completions.recv().await.unwrap(), SyncMessage::SyncComplete);

        assert_eq!(mock.request_count(Method::DELETE, "/api/tasks/srv-7"), 1);
        assert_eq!(db.count_pending_actions().await.unwrap(), 0);
        service.shutdown().await;
    }
}
