//! # Cross-Context Notifier
//!
//! Advisory messages between the foreground and the background worker.
//!
//! - `TRIGGER_SYNC` travels foreground to worker over an `mpsc` channel
//! - `SYNC_COMPLETE` travels worker to every foreground context over a
//!   `broadcast` channel
//! - background-sync registrations (a tag the platform should call back
//!   with once it has connectivity) travel foreground to worker alongside
//!   the triggers
//!
//! Delivery is best-effort and at most once. A full or closed channel is
//! logged and dropped; the next connectivity event or periodic pass
//! re-triggers the same drain, and a receiver always re-reads the store.

use crate::shared::event::SyncMessage;
use tokio::sync::{broadcast, mpsc};

/// Pending triggers held before new ones are dropped
pub const TRIGGER_CAPACITY: usize = 16;

/// Completions held per subscriber before the oldest are overwritten
pub const COMPLETION_CAPACITY: usize = 64;

/// Sender side of `SYNC_COMPLETE`
pub type CompletionBroadcast = broadcast::Sender<SyncMessage>;

/// Create the two connected endpoints
pub fn notifier_pair() -> (ForegroundEndpoint, WorkerEndpoint) {
    let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);
    let (tag_tx, tag_rx) = mpsc::channel(TRIGGER_CAPACITY);
    let (complete_tx, _) = broadcast::channel(COMPLETION_CAPACITY);

    (
        ForegroundEndpoint {
            trigger_tx,
            tag_tx,
            complete_tx: complete_tx.downgrade(),
        },
        WorkerEndpoint {
            inbox: WorkerInbox {
                trigger_rx,
                tag_rx,
                triggers_open: true,
                tags_open: true,
            },
            complete_tx,
        },
    )
}

/// Something the worker was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Message(SyncMessage),
    /// The platform fired the background-sync callback for this tag
    BackgroundSync(String),
}

/// Foreground side; cheap to clone, one per page or view
///
/// Holds only a weak handle on the completion channel, so subscribers see
/// it close once the worker is gone.
#[derive(Clone)]
pub struct ForegroundEndpoint {
    trigger_tx: mpsc::Sender<SyncMessage>,
    tag_tx: mpsc::Sender<String>,
    complete_tx: broadcast::WeakSender<SyncMessage>,
}

impl std::fmt::Debug for ForegroundEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForegroundEndpoint")
            .field("worker_alive", &!self.trigger_tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl ForegroundEndpoint {
    /// Post a message to the worker without waiting; returns whether it was accepted
    pub fn post(&self, message: SyncMessage) -> bool {
        match self.trigger_tx.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("[Notifier] Dropped {:?}: {}", message, e);
                false
            }
        }
    }

    /// Post a message in its JSON wire form; unknown types are ignored
    pub fn post_json(&self, raw: &str) -> bool {
        SyncMessage::from_json(raw).is_some_and(|message| self.post(message))
    }

    /// Ask the platform to fire a background-sync callback for `tag`
    pub fn register_background_sync(&self, tag: &str) -> bool {
        match self.tag_tx.try_send(tag.to_string()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("[Notifier] Background sync registration for {} dropped: {}", tag, e);
                false
            }
        }
    }

    /// Receive every `SYNC_COMPLETE` sent from now on
    ///
    /// If the worker is already gone the receiver is closed from the start.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        match self.complete_tx.upgrade() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }
}

/// Incoming side of the worker
#[derive(Debug)]
pub struct WorkerInbox {
    trigger_rx: mpsc::Receiver<SyncMessage>,
    tag_rx: mpsc::Receiver<String>,
    triggers_open: bool,
    tags_open: bool,
}

impl WorkerInbox {
    /// Next event from any foreground context; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        loop {
            if !self.triggers_open && !self.tags_open {
                return None;
            }
            tokio::select! {
                message = self.trigger_rx.recv(), if self.triggers_open => match message {
                    Some(message) => return Some(WorkerEvent::Message(message)),
                    None => self.triggers_open = false,
                },
                tag = self.tag_rx.recv(), if self.tags_open => match tag {
                    Some(tag) => return Some(WorkerEvent::BackgroundSync(tag)),
                    None => self.tags_open = false,
                },
            }
        }
    }
}

/// Worker side
#[derive(Debug)]
pub struct WorkerEndpoint {
    inbox: WorkerInbox,
    complete_tx: CompletionBroadcast,
}

impl WorkerEndpoint {
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.inbox.recv().await
    }

    pub fn broadcaster(&self) -> CompletionBroadcaster {
        CompletionBroadcaster {
            tx: self.complete_tx.clone(),
        }
    }

    /// Split into the incoming side and the completion broadcaster
    pub fn into_parts(self) -> (WorkerInbox, CompletionBroadcaster) {
        (
            self.inbox,
            CompletionBroadcaster {
                tx: self.complete_tx,
            },
        )
    }
}

/// Tells every foreground context to re-read the store
#[derive(Debug, Clone)]
pub struct CompletionBroadcaster {
    tx: CompletionBroadcast,
}

impl CompletionBroadcaster {
    /// A broadcaster with no foreground attached yet
    pub fn detached() -> Self {
        let (tx, _) = broadcast::channel(COMPLETION_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.tx.subscribe()
    }

    /// Returns the number of contexts reached; zero listeners is not an error
    pub fn notify_sync_complete(&self) -> usize {
        match self.tx.send(SyncMessage::SyncComplete) {
            Ok(count) => {
                tracing::info!("[Notifier] SYNC_COMPLETE sent to {} clients", count);
                count
            }
            Err(e) => {
                tracing::debug!("[Notifier] No clients to receive SYNC_COMPLETE: {:?}", e);
                0
            }
        }
    }
}
