//! # Sync Engine
//!
//! One drain pass turns queued intents into confirmed remote changes.
//!
//! ## Pass
//!
//! 1. Snapshot the queue in insertion order; an empty queue ends the pass
//! 2. For each entry, re-read it from the store (another pass or context may
//!    have settled it) and replay it:
//!    - 2xx: remove the entry and, for a create with a temporary id,
//!      move the task to the server id in the same transaction
//!    - 4xx: permanent, move the entry to `rejected_actions`
//!    - anything else: transient, keep the entry; later entries for the same
//!      record are held back for this pass so they cannot overtake it
//! 3. Tell every foreground context to re-read the store
//!
//! A failure on one entry never aborts the pass. Passes are serialized, and
//! running one on a drained queue is a no-op.

use crate::local_db::LocalDatabase;
use crate::network::{HttpRequest, Transport};
use crate::notifier::CompletionBroadcaster;
use crate::offline::reconciliation::{outgoing_body, remap_for, IdRemap};
use crate::offline::retry::RetryManager;
use crate::shared::action::{ActionKind, EntityKind, PendingAction};
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, TransportError};
use reqwest::Url;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;

/// Longest server error text kept as a rejection reason
const MAX_REASON_LEN: usize = 200;

/// What started a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    /// Offline to online transition
    ConnectivityRestored,
    /// `TRIGGER_SYNC` from a foreground context
    Requested,
    /// Platform background-sync callback for the configured tag
    BackgroundSync,
    /// Poll timer; the only trigger subject to backoff
    Periodic,
}

/// Result of replaying one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The server accepted it
    Applied { remap: Option<IdRemap> },
    /// The server refused it; resubmitting unchanged cannot succeed
    Rejected { status: Option<u16>, reason: String },
    /// Try again on a later pass
    Deferred { reason: String },
}

/// Summary of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub trigger: DrainTrigger,
    /// Entries in the snapshot
    pub queued: usize,
    /// Entries sent to the server
    pub attempted: usize,
    pub applied: usize,
    pub rejected: usize,
    pub deferred: usize,
    /// Entries already gone from the store when their turn came
    pub skipped: usize,
    /// Time left before periodic passes resume, when this one was skipped
    pub backed_off: Option<Duration>,
}

impl DrainReport {
    fn new(trigger: DrainTrigger) -> Self {
        Self {
            trigger,
            queued: 0,
            attempted: 0,
            applied: 0,
            rejected: 0,
            deferred: 0,
            skipped: 0,
            backed_off: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.queued == 0
    }
}

/// Replays the mutation queue against the remote API
#[derive(Debug)]
pub struct SyncEngine<T> {
    db: LocalDatabase,
    transport: T,
    origin: Url,
    api_prefix: String,
    retry: RetryManager,
    broadcaster: CompletionBroadcaster,
    drain_lock: Mutex<()>,
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(
        db: LocalDatabase,
        transport: T,
        config: &SyncConfig,
        broadcaster: CompletionBroadcaster,
    ) -> Result<Self> {
        // Settling an entry writes to rejected_actions
        db.require_current()?;
        Ok(Self {
            db,
            transport,
            origin: config.origin()?,
            api_prefix: config.api_prefix.clone(),
            retry: RetryManager::from_config(config),
            broadcaster,
            drain_lock: Mutex::new(()),
        })
    }

    pub fn db(&self) -> &LocalDatabase {
        &self.db
    }

    /// Run one drain pass
    ///
    /// Only failures to read the queue are returned as errors. Everything
    /// that goes wrong with a single entry is counted in the report.
    pub async fn drain(&self, trigger: DrainTrigger) -> Result<DrainReport> {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::new(trigger);

        if trigger == DrainTrigger::Periodic {
            if let Some(wait) = self.retry.periodic_wait().await {
                tracing::debug!("[Sync] Periodic pass skipped, backing off for {:?}", wait);
                report.backed_off = Some(wait);
                return Ok(report);
            }
        }

        let snapshot = self.db.drain_queue_snapshot().await?;
        report.queued = snapshot.len();
        let queued: HashSet<i64> = snapshot.iter().map(|action| action.id).collect();
        self.retry.retain_queued(&queued).await;
        if snapshot.is_empty() {
            tracing::debug!("[Sync] No pending actions to sync ({:?})", trigger);
            self.retry.record_pass(false).await;
            return Ok(report);
        }

        tracing::info!(
            "[Sync] Draining {} pending actions ({:?})",
            snapshot.len(),
            trigger
        );

        let mut held_back: HashSet<(EntityKind, String)> = HashSet::new();

        for queued in snapshot {
            // Earlier entries in this pass may have rewritten or removed it
            let action = match self.db.get_action(queued.id).await {
                Ok(Some(action)) => action,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!("[Sync] Failed to re-read action {}: {}", queued.id, e);
                    report.deferred += 1;
                    hold_back(&mut held_back, &queued);
                    continue;
                }
            };

            if let Some(id) = action.entity_id() {
                if held_back.contains(&(action.entity, id.to_string())) {
                    tracing::debug!(
                        "[Sync] Holding back action {}: earlier change to {} is pending",
                        action.id,
                        id
                    );
                    report.deferred += 1;
                    continue;
                }
            }

            report.attempted += 1;
            let outcome = self.replay(&action).await;
            match self.settle(&action, outcome).await {
                Ok(SettledAs::Applied) => report.applied += 1,
                Ok(SettledAs::Rejected) => report.rejected += 1,
                Ok(SettledAs::Deferred) => {
                    report.deferred += 1;
                    hold_back(&mut held_back, &action);
                }
                Err(e) => {
                    tracing::error!("[Sync] Failed to record outcome of action {}: {}", action.id, e);
                    report.deferred += 1;
                    hold_back(&mut held_back, &action);
                }
            }
        }

        if let Some(delay) = self.retry.record_pass(report.deferred > 0).await {
            tracing::warn!(
                "[Sync] {} actions still pending, next periodic pass in {:?}",
                report.deferred,
                delay
            );
        }

        tracing::info!(
            "[Sync] Sync complete: {} applied, {} rejected, {} deferred, {} skipped",
            report.applied,
            report.rejected,
            report.deferred,
            report.skipped
        );
        self.broadcaster.notify_sync_complete();

        Ok(report)
    }

    /// Send one entry to the server and classify the answer
    pub async fn replay(&self, action: &PendingAction) -> ReplayOutcome {
        let request = match self.build_request(action) {
            Ok(request) => request,
            Err(e) => {
                return ReplayOutcome::Rejected {
                    status: None,
                    reason: e.to_string(),
                }
            }
        };

        tracing::debug!(
            "[Sync] Replaying action {}: {} {}",
            action.id,
            request.method,
            request.url
        );

        match self.transport.fetch(request).await {
            Ok(response) if response.is_ok() => ReplayOutcome::Applied {
                remap: remap_for(action, &response.body),
            },
            Ok(response) if response.is_client_error() => ReplayOutcome::Rejected {
                status: Some(response.status),
                reason: reason_from(&response.text(), response.status),
            },
            Ok(response) => ReplayOutcome::Deferred {
                reason: format!("server answered {}", response.status),
            },
            Err(e @ TransportError::InvalidRequest(_)) => ReplayOutcome::Rejected {
                status: None,
                reason: e.to_string(),
            },
            Err(e) => ReplayOutcome::Deferred {
                reason: e.to_string(),
            },
        }
    }

    fn build_request(&self, action: &PendingAction) -> std::result::Result<HttpRequest, TransportError> {
        let collection = format!("{}{}", self.api_prefix, action.entity.collection());
        let mut url = self
            .origin
            .join(&collection)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        if action.action != ActionKind::Create {
            let id = action.entity_id().ok_or_else(|| {
                TransportError::InvalidRequest(format!(
                    "{} {} without an id",
                    action.action.as_str(),
                    action.entity.as_str()
                ))
            })?;
            url.path_segments_mut()
                .map_err(|_| TransportError::InvalidRequest(url_string(&self.origin)))?
                .push(id);
        }

        let request = HttpRequest::new(action.action.method(), url)
            .with_header("accept", "application/json");
        match outgoing_body(action) {
            Some(body) => request.with_json(&body),
            None => Ok(request),
        }
    }

    async fn settle(&self, action: &PendingAction, outcome: ReplayOutcome) -> Result<SettledAs> {
        match outcome {
            ReplayOutcome::Applied { remap: Some(remap) } => {
                let rewritten = self
                    .db
                    .reconcile_created(action, &remap.temp_id, &remap.server_id)
                    .await?;
                tracing::info!(
                    "[Sync] Action {} synced, {} is now {} ({} later actions updated)",
                    action.id,
                    remap.temp_id,
                    remap.server_id,
                    rewritten
                );
                self.retry.clear(action.id).await;
                Ok(SettledAs::Applied)
            }
            ReplayOutcome::Applied { remap: None } => {
                self.db.complete_action(action).await?;
                tracing::info!("[Sync] Action synced successfully: {}", action.id);
                self.retry.clear(action.id).await;
                Ok(SettledAs::Applied)
            }
            ReplayOutcome::Rejected { status, reason } => {
                self.db.reject_action(action, status, &reason).await?;
                tracing::error!(
                    "[Sync] Action {} rejected ({}): {}",
                    action.id,
                    status.map_or_else(|| "no status".to_string(), |s| s.to_string()),
                    reason
                );
                self.retry.clear(action.id).await;
                Ok(SettledAs::Rejected)
            }
            ReplayOutcome::Deferred { reason } => {
                let attempts = self.retry.record_failure(action.id, reason.as_str()).await;
                if self.retry.is_exhausted(attempts) {
                    let reason = format!("gave up after {} attempts: {}", attempts, reason);
                    self.db.reject_action(action, None, &reason).await?;
                    tracing::error!("[Sync] Action {} rejected: {}", action.id, reason);
                    self.retry.clear(action.id).await;
                    return Ok(SettledAs::Rejected);
                }
                tracing::warn!(
                    "[Sync] Failed to sync action {} (attempt {}): {}",
                    action.id,
                    attempts,
                    reason
                );
                Ok(SettledAs::Deferred)
            }
        }
    }
}

enum SettledAs {
    Applied,
    Rejected,
    Deferred,
}

fn hold_back(held_back: &mut HashSet<(EntityKind, String)>, action: &PendingAction) {
    if let Some(id) = action.entity_id() {
        held_back.insert((action.entity, id.to_string()));
    }
}

fn reason_from(body: &str, status: u16) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("server answered {}", status);
    }
    body.chars().take(MAX_REASON_LEN).collect()
}

fn url_string(url: &Url) -> String {
    format!("cannot build a path on {}", url)
}
