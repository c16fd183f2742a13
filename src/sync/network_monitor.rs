//! # Network Monitor
//!
//! Platform connectivity as a `watch` value. Both contexts see the same
//! status; the worker drains when it turns online.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Shared connectivity flag
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<NetworkStatus>>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status() == NetworkStatus::Online
    }

    /// Record an online/offline event; returns true on an offline to online transition
    pub fn set_online(&self, online: bool) -> bool {
        let status = if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };
        let previous = self.tx.send_replace(status);
        if previous != status {
            tracing::info!("[Sync] Connectivity changed: {:?} -> {:?}", previous, status);
        }
        previous == NetworkStatus::Offline && status == NetworkStatus::Online
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}
