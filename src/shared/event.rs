//! Cross-Context Messages
//!
//! Structured messages exchanged between the foreground and the background
//! worker. The wire form is a JSON object with a `type` discriminator:
//!
//! ```json
//! { "type": "TRIGGER_SYNC" }
//! { "type": "SYNC_COMPLETE" }
//! ```
//!
//! Messages are advisory. They never carry task data; a receiver re-reads
//! the local store.

use serde::{Deserialize, Serialize};

/// Message passed across the foreground/background boundary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// Foreground to worker: attempt a drain now
    TriggerSync,
    /// Worker to every foreground context: re-read local state
    SyncComplete,
}

impl SyncMessage {
    pub fn to_json(&self) -> String {
        match self {
            SyncMessage::TriggerSync => r#"{"type":"TRIGGER_SYNC"}"#.to_string(),
            SyncMessage::SyncComplete => r#"{"type":"SYNC_COMPLETE"}"#.to_string(),
        }
    }

    /// Parse a structured message, ignoring anything that is not one of ours
    pub fn from_json(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!("[Notifier] Ignoring unrecognised message {}: {}", raw, e);
                None
            }
        }
    }
}
