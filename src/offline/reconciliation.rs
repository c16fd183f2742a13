//! # Id Reconciliation
//!
//! The server is the authority for ids on create. A task created offline
//! carries a temporary id locally; the id is stripped from the outgoing
//! create, and the id in the server's reply replaces it locally once the
//! create is confirmed.
//!
//! Between devices the policy is last-write-wins by server-side timestamp:
//! nothing here merges remote state into a dirty local record.

use crate::shared::action::{ActionKind, PendingAction};
use crate::shared::task::is_temp_id;
use serde_json::Value;

/// A confirmed create whose local id must move to the server's id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRemap {
    pub temp_id: String,
    pub server_id: String,
}

/// Body to send when replaying `action`
///
/// Deletes carry no body. A create drops its id when the id is temporary.
pub fn outgoing_body(action: &PendingAction) -> Option<Value> {
    match action.action {
        ActionKind::Delete => None,
        ActionKind::Update => Some(action.data.clone()),
        ActionKind::Create => {
            let mut body = action.data.clone();
            if let Some(object) = body.as_object_mut() {
                if object.get("id").and_then(Value::as_str).is_some_and(is_temp_id) {
                    object.remove("id");
                }
            }
            Some(body)
        }
    }
}

/// Id the server assigned, read from a create's response body
///
/// Accepts a record (`{"id": ..}`) or a list of records, taking the first.
/// Numeric ids are rendered as strings.
pub fn server_id_from_body(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let record = match &value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match record.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// The remap a confirmed create calls for, if any
pub fn remap_for(action: &PendingAction, response_body: &[u8]) -> Option<IdRemap> {
    if action.action != ActionKind::Create {
        return None;
    }
    let temp_id = action.entity_id().filter(|id| is_temp_id(id))?;
    let server_id = server_id_from_body(response_body)?;
    if server_id == temp_id {
        return None;
    }
    Some(IdRemap {
        temp_id: temp_id.to_string(),
        server_id,
    })
}
