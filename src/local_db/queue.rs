//! # Mutation Queue
//!
//! Pending actions in insertion order, plus the multi-row operations that
//! keep cached tasks and the queue consistent:
//!
//! - **Optimistic writes**: the task change and its enqueue commit together
//! - **Completion**: removing a replayed action settles its task
//! - **Reconciliation**: a confirmed create moves the task to its server id,
//!   rewrites later actions that still use the temporary id and removes the
//!   replayed action, all in one transaction
//! - **Rejection**: a refused action moves to `rejected_actions`

use crate::local_db::tasks::{delete_task_on, get_task_on, put_task_on, settle_task_on};
use crate::local_db::LocalDatabase;
use crate::shared::action::{ActionKind, EntityKind, NewAction, PendingAction, RejectedAction};
use crate::shared::error::{Result, SyncError};
use crate::shared::task::{now_millis, CachedTask};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const ACTION_COLUMNS: &str = "id, action, entity, data, timestamp";

impl LocalDatabase {
    /// Append an action with a fresh sequence number and the current time
    pub async fn enqueue(&self, action: NewAction) -> Result<PendingAction> {
        let mut conn = self.pool.acquire().await?;
        enqueue_on(&mut conn, &action).await
    }

    /// Every pending action in insertion order; nothing is removed
    pub async fn drain_queue_snapshot(&self) -> Result<Vec<PendingAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pending_actions ORDER BY id ASC",
            ACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_action).collect()
    }

    /// A single pending action, if it is still queued
    pub async fn get_action(&self, id: i64) -> Result<Option<PendingAction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM pending_actions WHERE id = ?",
            ACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_action).transpose()
    }

    /// Pending actions enqueued at or after `timestamp` (epoch millis)
    pub async fn actions_since(&self, timestamp: i64) -> Result<Vec<PendingAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pending_actions WHERE timestamp >= ? ORDER BY id ASC",
            ACTION_COLUMNS
        ))
        .bind(timestamp)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_action).collect()
    }

    /// Remove one pending action; removing an absent key is not an error
    pub async fn remove_action(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of actions waiting in the queue
    pub async fn count_pending_actions(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Write a task and enqueue its action as one unit
    pub async fn record_optimistic_put(
        &self,
        task: &CachedTask,
        action: NewAction,
    ) -> Result<PendingAction> {
        let mut tx = self.pool.begin().await?;
        put_task_on(&mut tx, task).await?;
        let pending = enqueue_on(&mut tx, &action).await?;
        tx.commit().await?;
        Ok(pending)
    }

    /// Delete a task and enqueue its action as one unit
    pub async fn record_optimistic_delete(
        &self,
        id: &str,
        action: NewAction,
    ) -> Result<PendingAction> {
        let mut tx = self.pool.begin().await?;
        delete_task_on(&mut tx, id).await?;
        let pending = enqueue_on(&mut tx, &action).await?;
        tx.commit().await?;
        Ok(pending)
    }

    /// Remove a confirmed action and settle the task it touched
    pub async fn complete_action(&self, action: &PendingAction) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pending_actions WHERE id = ?")
            .bind(action.id)
            .execute(&mut *tx)
            .await?;
        if let (EntityKind::Task, Some(id)) = (action.entity, action.entity_id()) {
            settle_task_on(&mut tx, id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Apply a confirmed create whose server id differs from the temporary one
    ///
    /// The record under `temp_id` is replaced by one under `server_id` with the
    /// same fields, later actions referring to `temp_id` are rewritten to
    /// `server_id`, and the replayed action is removed. Returns the number of
    /// later actions rewritten.
    pub async fn reconcile_created(
        &self,
        action: &PendingAction,
        temp_id: &str,
        server_id: &str,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pending_actions WHERE id = ?")
            .bind(action.id)
            .execute(&mut *tx)
            .await?;

        let rewritten = remap_pending_on(&mut tx, action.entity, temp_id, server_id).await?;

        if action.entity == EntityKind::Task {
            if let Some(mut task) = get_task_on(&mut tx, temp_id).await? {
                delete_task_on(&mut tx, temp_id).await?;
                task.id = server_id.to_string();
                put_task_on(&mut tx, &task).await?;
                settle_task_on(&mut tx, server_id).await?;
            }
        }

        tx.commit().await?;
        Ok(rewritten)
    }

    /// Move a refused action out of the queue into `rejected_actions`
    pub async fn reject_action(
        &self,
        action: &PendingAction,
        status: Option<u16>,
        reason: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO rejected_actions (
                id, action, entity, entity_id, data, timestamp, status, reason, rejected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(action.id)
        .bind(action.action.as_str())
        .bind(action.entity.as_str())
        .bind(action.entity_id())
        .bind(serde_json::to_string(&action.data)?)
        .bind(action.timestamp)
        .bind(status.map(i64::from))
        .bind(reason)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM pending_actions WHERE id = ?")
            .bind(action.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Actions the server refused, oldest first
    pub async fn rejected_actions(&self) -> Result<Vec<RejectedAction>> {
        let rows = sqlx::query(
            "SELECT id, action, entity, data, timestamp, status, reason, rejected_at
             FROM rejected_actions ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rejected).collect()
    }

    /// Drop a rejected action for good
    ///
    /// A rejected create of a temporary id never reached the server, so the
    /// local record is removed with it. Otherwise the task is settled and the
    /// next refresh from the server overwrites the local copy.
    pub async fn discard_rejected(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let rejected = fetch_rejected_on(&mut tx, id)
            .await?
            .ok_or_else(|| SyncError::not_found("rejected action", id.to_string()))?;

        sqlx::query("DELETE FROM rejected_actions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let (EntityKind::Task, Some(entity_id)) = (rejected.entity, rejected.entity_id()) {
            if rejected.action == ActionKind::Create && crate::shared::task::is_temp_id(entity_id) {
                delete_task_on(&mut tx, entity_id).await?;
            } else {
                settle_task_on(&mut tx, entity_id).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Put a rejected action back at the tail of the queue
    pub async fn resubmit_rejected(&self, id: i64) -> Result<PendingAction> {
        let mut tx = self.pool.begin().await?;
        let rejected = fetch_rejected_on(&mut tx, id)
            .await?
            .ok_or_else(|| SyncError::not_found("rejected action", id.to_string()))?;

        sqlx::query("DELETE FROM rejected_actions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let pending = enqueue_on(
            &mut tx,
            &NewAction::new(rejected.action, rejected.entity, rejected.data),
        )
        .await?;

        tx.commit().await?;
        Ok(pending)
    }
}

async fn enqueue_on(conn: &mut SqliteConnection, action: &NewAction) -> Result<PendingAction> {
    let timestamp = now_millis();
    let data = serde_json::to_string(&action.data)?;

    let result = sqlx::query(
        "INSERT INTO pending_actions (action, entity, entity_id, data, timestamp)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(action.action.as_str())
    .bind(action.entity.as_str())
    .bind(action.entity_id())
    .bind(data)
    .bind(timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(PendingAction {
        id: result.last_insert_rowid(),
        action: action.action,
        entity: action.entity,
        data: action.data.clone(),
        timestamp,
    })
}

/// Point pending actions at `server_id` wherever they still use `temp_id`
async fn remap_pending_on(
    conn: &mut SqliteConnection,
    entity: EntityKind,
    temp_id: &str,
    server_id: &str,
) -> Result<u64> {
    let rows = sqlx::query("SELECT id, data FROM pending_actions WHERE entity = ? AND entity_id = ?")
        .bind(entity.as_str())
        .bind(temp_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut rewritten = 0;
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let raw: String = row.try_get("data")?;
        let mut data: Value = serde_json::from_str(&raw)?;
        if let Some(object) = data.as_object_mut() {
            object.insert("id".to_string(), Value::String(server_id.to_string()));
        }

        sqlx::query("UPDATE pending_actions SET entity_id = ?, data = ? WHERE id = ?")
            .bind(server_id)
            .bind(serde_json::to_string(&data)?)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        rewritten += 1;
    }

    Ok(rewritten)
}

async fn fetch_rejected_on(conn: &mut SqliteConnection, id: i64) -> Result<Option<RejectedAction>> {
    let row = sqlx::query(
        "SELECT id, action, entity, data, timestamp, status, reason, rejected_at
         FROM rejected_actions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_rejected).transpose()
}

fn parse_kinds(row: &SqliteRow, table: &'static str) -> Result<(ActionKind, EntityKind)> {
    let action: String = row.try_get("action")?;
    let entity: String = row.try_get("entity")?;
    let action = ActionKind::parse(&action)
        .ok_or_else(|| SyncError::corrupt(table, format!("action {}", action)))?;
    let entity = EntityKind::parse(&entity)
        .ok_or_else(|| SyncError::corrupt(table, format!("entity {}", entity)))?;
    Ok((action, entity))
}

fn row_to_action(row: &SqliteRow) -> Result<PendingAction> {
    let (action, entity) = parse_kinds(row, "pending_actions")?;
    let data: String = row.try_get("data")?;

    Ok(PendingAction {
        id: row.try_get("id")?,
        action,
        entity,
        data: serde_json::from_str(&data)?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn row_to_rejected(row: &SqliteRow) -> Result<RejectedAction> {
    let (action, entity) = parse_kinds(row, "rejected_actions")?;
    let data: String = row.try_get("data")?;
    let status: Option<i64> = row.try_get("status")?;

    Ok(RejectedAction {
        id: row.try_get("id")?,
        action,
        entity,
        data: serde_json::from_str(&data)?,
        timestamp: row.try_get("timestamp")?,
        status: status.and_then(|s| u16::try_from(s).ok()),
        reason: row.try_get("reason")?,
        rejected_at: row.try_get("rejected_at")?,
    })
}
