//! # Background Worker
//!
//! Lifecycle of the background context:
//!
//! - **install**: fetch the static manifest into the static namespace, all
//!   or nothing
//! - **activate**: evict every namespace that is not current
//! - **fetch**: answer intercepted requests through the cache policy
//! - **message** / **background sync**: run a drain pass on request
//!
//! The long-running triggers (reconnects, the poll timer, messages arriving
//! while idle) are handled by the [`SyncService`] started with
//! [`SyncWorker::start`].

use crate::local_db::LocalDatabase;
use crate::network::{HttpRequest, HttpResponse, Interceptor, Transport};
use crate::notifier::{CompletionBroadcaster, WorkerInbox};
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, TransportError};
use crate::shared::event::SyncMessage;
use crate::sync::{
    trigger_for_message, trigger_for_tag, DrainReport, DrainTrigger, NetworkMonitor, SyncEngine,
    SyncService,
};
use std::sync::Arc;

/// The background context
#[derive(Debug)]
pub struct SyncWorker<T> {
    config: SyncConfig,
    interceptor: Interceptor<T>,
    engine: Arc<SyncEngine<T>>,
    monitor: NetworkMonitor,
}

impl<T> SyncWorker<T>
where
    T: Transport + Clone + 'static,
{
    pub fn new(
        config: SyncConfig,
        db: LocalDatabase,
        transport: T,
        broadcaster: CompletionBroadcaster,
        monitor: NetworkMonitor,
    ) -> Result<Self> {
        let interceptor = Interceptor::new(transport.clone(), db.clone(), &config)?;
        let engine = Arc::new(SyncEngine::new(db, transport, &config, broadcaster)?);
        Ok(Self {
            config,
            interceptor,
            engine,
            monitor,
        })
    }

    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }

    pub fn interceptor(&self) -> &Interceptor<T> {
        &self.interceptor
    }

    /// Seed the static namespace; returns the number of assets cached
    pub async fn install(&self) -> Result<usize> {
        tracing::info!("[Worker] Installing {}", self.interceptor.static_cache_name());
        let cached = self.interceptor.precache().await?;
        tracing::info!("[Worker] Cached {} static assets", cached);
        Ok(cached)
    }

    /// Drop stale namespaces; returns their names
    pub async fn activate(&self) -> Result<Vec<String>> {
        tracing::info!("[Worker] Activating");
        self.interceptor.evict_stale().await
    }

    /// Answer a request from a foreground context
    pub async fn handle_fetch(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        self.interceptor.handle(request).await
    }

    /// React to a message posted by a foreground context
    pub async fn handle_message(&self, message: SyncMessage) -> Result<Option<DrainReport>> {
        match trigger_for_message(message) {
            Some(trigger) => {
                tracing::info!("[Worker] Manual sync triggered");
                self.engine.drain(trigger).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// React to a JSON message; anything unrecognised is ignored
    pub async fn handle_raw_message(&self, raw: &str) -> Result<Option<DrainReport>> {
        match SyncMessage::from_json(raw) {
            Some(message) => self.handle_message(message).await,
            None => Ok(None),
        }
    }

    /// Platform background-sync callback; only the configured tag drains
    pub async fn handle_background_sync(&self, tag: &str) -> Result<Option<DrainReport>> {
        tracing::info!("[Worker] Background sync: {}", tag);
        match trigger_for_tag(tag, &self.config.sync_tag) {
            Some(trigger) => self.engine.drain(trigger).await.map(Some),
            None => Ok(None),
        }
    }

    /// Platform online/offline event seen by the worker
    pub async fn handle_connectivity(&self, online: bool) -> Result<Option<DrainReport>> {
        if self.monitor.set_online(online) {
            return self
                .engine
                .drain(DrainTrigger::ConnectivityRestored)
                .await
                .map(Some);
        }
        Ok(None)
    }

    /// Start the long-running loop
    pub fn start(&self, inbox: WorkerInbox) -> SyncService {
        SyncService::spawn(
            Arc::clone(&self.engine),
            inbox,
            self.monitor.clone(),
            &self.config,
        )
    }
}
