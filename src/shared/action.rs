//! Pending Actions
//!
//! A mutation recorded locally and waiting to be replayed against the
//! remote API. The store assigns each action an auto-incrementing key;
//! key order is insertion order and is the only ordering guarantee.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of mutation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(ActionKind::Create),
            "update" => Some(ActionKind::Update),
            "delete" => Some(ActionKind::Delete),
            _ => None,
        }
    }

    /// HTTP method used to replay this action
    pub fn method(&self) -> reqwest::Method {
        match self {
            ActionKind::Create => reqwest::Method::POST,
            ActionKind::Update => reqwest::Method::PATCH,
            ActionKind::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Kind of record an action applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Project,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Project => "project",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task" => Some(EntityKind::Task),
            "project" => Some(EntityKind::Project),
            _ => None,
        }
    }

    /// Collection segment of the resource path, e.g. `tasks`
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Project => "projects",
        }
    }
}

/// An action about to be enqueued
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub action: ActionKind,
    pub entity: EntityKind,
    /// Full record for create, patch plus `id` for update, `{ "id": .. }` for delete
    pub data: Value,
}

impl NewAction {
    pub fn new(action: ActionKind, entity: EntityKind, data: Value) -> Self {
        Self { action, entity, data }
    }

    pub fn create(entity: EntityKind, record: Value) -> Self {
        Self::new(ActionKind::Create, entity, record)
    }

    /// Update with the target id merged into the patch
    pub fn update(entity: EntityKind, id: &str, patch: Value) -> Self {
        let mut data = patch;
        match data.as_object_mut() {
            Some(object) => {
                object.insert("id".to_string(), Value::String(id.to_string()));
            }
            None => data = serde_json::json!({ "id": id }),
        }
        Self::new(ActionKind::Update, entity, data)
    }

    pub fn delete(entity: EntityKind, id: &str) -> Self {
        Self::new(ActionKind::Delete, entity, serde_json::json!({ "id": id }))
    }

    /// Id of the record this action refers to, if the payload carries one
    pub fn entity_id(&self) -> Option<&str> {
        payload_id(&self.data)
    }
}

/// A persisted action awaiting replay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAction {
    /// Auto-incrementing queue key
    pub id: i64,
    pub action: ActionKind,
    pub entity: EntityKind,
    pub data: Value,
    /// Enqueue time, epoch milliseconds
    pub timestamp: i64,
}

impl PendingAction {
    pub fn entity_id(&self) -> Option<&str> {
        payload_id(&self.data)
    }
}

/// A pending action the server refused with a client error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedAction {
    /// Key the action had in the pending queue
    pub id: i64,
    pub action: ActionKind,
    pub entity: EntityKind,
    pub data: Value,
    pub timestamp: i64,
    /// HTTP status returned by the server, if any
    pub status: Option<u16>,
    pub reason: String,
    pub rejected_at: i64,
}

impl RejectedAction {
    pub fn entity_id(&self) -> Option<&str> {
        payload_id(&self.data)
    }
}

fn payload_id(data: &Value) -> Option<&str> {
    data.get("id").and_then(Value::as_str)
}
