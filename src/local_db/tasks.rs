//! # Cached Task Operations
//!
//! Storage of [`CachedTask`] records. A put is a full replacement by id with
//! no merge, except that `updated_at` never moves backwards for an id.

use crate::local_db::LocalDatabase;
use crate::shared::error::{Result, SyncError};
use crate::shared::task::{Assignee, CachedTask, Priority, SyncState, TaskFields};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const TASK_COLUMNS: &str = "id, name, description, priority, due_date, assignee, project, tags,
     completed, created_at, updated_at, sync_state";

impl LocalDatabase {
    /// Insert or overwrite a task by id
    pub async fn put_task(&self, task: &CachedTask) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        put_task_on(&mut conn, task).await
    }

    /// Get a single task by id
    pub async fn get_task(&self, id: &str) -> Result<Option<CachedTask>> {
        let mut conn = self.pool.acquire().await?;
        get_task_on(&mut conn, id).await
    }

    /// All cached tasks, oldest first
    pub async fn get_all_tasks(&self) -> Result<Vec<CachedTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    /// Tasks belonging to a project
    pub async fn tasks_by_project(&self, project: &str) -> Result<Vec<CachedTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE project = ? ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        ))
        .bind(project)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    /// Tasks with local changes the server has not confirmed
    pub async fn dirty_tasks(&self) -> Result<Vec<CachedTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE sync_state = ? ORDER BY updated_at ASC, id ASC",
            TASK_COLUMNS
        ))
        .bind(SyncState::Dirty.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    /// Number of tasks with unconfirmed local changes
    pub async fn count_unsynced_tasks(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE sync_state = ?")
            .bind(SyncState::Dirty.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Remove a task; removing an absent id is not an error
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        delete_task_on(&mut conn, id).await
    }
}

pub(crate) async fn put_task_on(conn: &mut SqliteConnection, task: &CachedTask) -> Result<()> {
    let assignee = task
        .fields
        .assignee
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let tags = serde_json::to_string(&task.fields.tags)?;

    sqlx::query(
        "INSERT INTO tasks (
            id, name, description, priority, due_date, assignee, project, tags,
            completed, created_at, updated_at, sync_state
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            priority = excluded.priority,
            due_date = excluded.due_date,
            assignee = excluded.assignee,
            project = excluded.project,
            tags = excluded.tags,
            completed = excluded.completed,
            created_at = excluded.created_at,
            updated_at = MAX(excluded.updated_at, tasks.updated_at),
            sync_state = excluded.sync_state",
    )
    .bind(&task.id)
    .bind(&task.fields.name)
    .bind(&task.fields.description)
    .bind(task.fields.priority.as_str())
    .bind(&task.fields.due_date)
    .bind(assignee)
    .bind(&task.fields.project)
    .bind(tags)
    .bind(task.fields.completed)
    .bind(task.created_at)
    .bind(task.updated_at)
    .bind(task.sync_state.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn get_task_on(conn: &mut SqliteConnection, id: &str) -> Result<Option<CachedTask>> {
    let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_task).transpose()
}

pub(crate) async fn delete_task_on(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Mark a task synced once nothing pending or rejected still refers to it
pub(crate) async fn settle_task_on(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET sync_state = 'synced'
         WHERE id = ?1
           AND NOT EXISTS (
               SELECT 1 FROM pending_actions WHERE entity = 'task' AND entity_id = ?1
           )
           AND NOT EXISTS (
               SELECT 1 FROM rejected_actions WHERE entity = 'task' AND entity_id = ?1
           )",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn row_to_task(row: &SqliteRow) -> Result<CachedTask> {
    let priority: String = row.try_get("priority")?;
    let sync_state: String = row.try_get("sync_state")?;
    let assignee: Option<String> = row.try_get("assignee")?;
    let tags: String = row.try_get("tags")?;

    let assignee = assignee
        .map(|raw| serde_json::from_str::<Assignee>(&raw))
        .transpose()?;

    Ok(CachedTask {
        id: row.try_get("id")?,
        fields: TaskFields {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            priority: Priority::parse(&priority)
                .ok_or_else(|| SyncError::corrupt("tasks", format!("priority {}", priority)))?,
            due_date: row.try_get("due_date")?,
            assignee,
            project: row.try_get("project")?,
            tags: serde_json::from_str(&tags)?,
            completed: row.try_get("completed")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        sync_state: SyncState::parse(&sync_state)
            .ok_or_else(|| SyncError::corrupt("tasks", format!("sync_state {}", sync_state)))?,
    })
}

#[cfg(test)]
mod tests {
    use crate::local_db::test_support::temp_db;
    use crate::shared::task::{Assignee, CachedTask, SyncState, TaskFields};
    use pretty_assertions::assert_eq;

    fn task(id: &str, project: Option<&str>) -> CachedTask {
        let mut fields = TaskFields::named(format!("Task {}", id));
        fields.project = project.map(str::to_string);
        fields.tags = vec!["Design".to_string()];
        fields.assignee = Some(Assignee {
            name: "Alice".to_string(),
            avatar_url: None,
        });
        CachedTask {
            id: id.to_string(),
            fields,
            created_at: 1_000,
            updated_at: 1_000,
            sync_state: SyncState::Synced,
        }
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let (_dir, db) = temp_db().await;
        let stored = task("srv-1", Some("website"));

        db.put_task(&stored).await.unwrap();

        assert_eq!(db.get_task("srv-1").await.unwrap(), Some(stored.clone()));
        assert_eq!(db.get_all_tasks().await.unwrap(), vec![stored]);
        assert_eq!(db.get_task("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_is_full_replacement() {
        let (_dir, db) = temp_db().await;
        db.put_task(&task("srv-1", Some("website"))).await.unwrap();

        let mut replacement = task("srv-1", None);
        replacement.fields.tags.clear();
        replacement.fields.assignee = None;
        replacement.updated_at = 2_000;
        db.put_task(&replacement).await.unwrap();

        assert_eq!(db.get_task("srv-1").await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn test_updated_at_never_moves_backwards() {
        let (_dir, db) = temp_db().await;
        let mut newer = task("srv-1", None);
        newer.updated_at = 5_000;
        db.put_task(&newer).await.unwrap();

        let mut older = task("srv-1", None);
        older.fields.name = "Renamed".to_string();
        older.updated_at = 3_000;
        db.put_task(&older).await.unwrap();

        let stored = db.get_task("srv-1").await.unwrap().unwrap();
        assert_eq!(stored.fields.name, "Renamed");
        assert_eq!(stored.updated_at, 5_000);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, db) = temp_db().await;
        db.put_task(&task("srv-1", None)).await.unwrap();

        db.delete_task("srv-1").await.unwrap();
        db.delete_task("srv-1").await.unwrap();

        assert!(db.get_all_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_indexed_queries() {
        let (_dir, db) = temp_db().await;
        db.put_task(&task("a", Some("website"))).await.unwrap();
        db.put_task(&task("b", Some("mobile"))).await.unwrap();
        let mut dirty = task("c", Some("website"));
        dirty.sync_state = SyncState::Dirty;
        db.put_task(&dirty).await.unwrap();

        let website: Vec<String> = db
            .tasks_by_project("website")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(website, vec!["a".to_string(), "c".to_string()]);

        assert_eq!(db.dirty_tasks().await.unwrap(), vec![dirty]);
        assert_eq!(db.count_unsynced_tasks().await.unwrap(), 1);
    }
}
