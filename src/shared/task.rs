//! Task Records
//!
//! The locally cached snapshot of a task. Field names follow the remote
//! API's JSON (`camelCase`), so a record can be posted as-is.
//!
//! # Identifiers
//!
//! Tasks created while offline get a temporary id with the reserved
//! [`TEMP_ID_PREFIX`]. The server assigns the authoritative id on create,
//! and the sync engine remaps the local record once the create is
//! confirmed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved prefix for client-generated task identifiers
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Generate a fresh temporary identifier
pub fn new_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4().simple())
}

/// Whether an id was generated on this device and not yet confirmed by the server
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Task priority
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Person a task is assigned to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Whether a cached record still has local changes the server has not confirmed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Synced,
    Dirty,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::Dirty => "dirty",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "synced" => Some(SyncState::Synced),
            "dirty" => Some(SyncState::Dirty),
            _ => None,
        }
    }
}

/// User-editable task fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub completed: bool,
}

impl TaskFields {
    /// Create fields for a new task with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = &patch.due_date {
            self.due_date = Some(due_date.clone());
        }
        if let Some(assignee) = &patch.assignee {
            self.assignee = Some(assignee.clone());
        }
        if let Some(project) = &patch.project {
            self.project = Some(project.clone());
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}

/// Partial update to a task; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Snapshot of a task as last known on this device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedTask {
    pub id: String,
    #[serde(flatten)]
    pub fields: TaskFields,
    /// Epoch milliseconds of the first local write
    pub created_at: i64,
    /// Epoch milliseconds of the last local write
    pub updated_at: i64,
    pub sync_state: SyncState,
}

impl CachedTask {
    /// A new locally created task, not yet known to the server
    pub fn new_local(fields: TaskFields) -> Self {
        let now = now_millis();
        Self {
            id: new_temp_id(),
            fields,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Dirty,
        }
    }

    /// A task as returned by the server
    pub fn synced(id: impl Into<String>, fields: TaskFields) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            fields,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Synced,
        }
    }

    pub fn is_temporary(&self) -> bool {
        is_temp_id(&self.id)
    }

    /// Payload for a `create` pending action: the full record with its id
    pub fn create_payload(&self) -> serde_json::Value {
        // Plain derived struct with string keys, so to_value cannot fail
        let mut payload = serde_json::to_value(&self.fields).unwrap_or_default();
        if let Some(object) = payload.as_object_mut() {
            object.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        }
        payload
    }
}
