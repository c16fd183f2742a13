//! Local store behaviour across restarts

use crate::common::TestStore;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use taskapp_sync::shared::config::CURRENT_SCHEMA_VERSION;
use taskapp_sync::shared::{CachedTask, EntityKind, NewAction, SyncError, TaskFields};

#[tokio::test]
async fn test_queue_survives_restart() {
    let store = TestStore::new().await;
    let task = CachedTask::new_local(TaskFields::named("Persist me"));
    store
        .db
        .record_optimistic_put(&task, NewAction::create(EntityKind::Task, task.create_payload()))
        .await
        .unwrap();
    let before = store.db.drain_queue_snapshot().await.unwrap();
    store.db.close().await;

    let reopened = store.reopen(CURRENT_SCHEMA_VERSION).await.unwrap();
    assert_eq!(reopened.version(), CURRENT_SCHEMA_VERSION);
    assert_eq!(reopened.drain_queue_snapshot().await.unwrap(), before);
    assert_eq!(reopened.get_task(&task.id).await.unwrap(), Some(task));

    // Keys keep increasing after a restart
    let next = reopened
        .enqueue(NewAction::delete(EntityKind::Task, "srv-1"))
        .await
        .unwrap();
    assert!(next.id > before[0].id);
}

#[tokio::test]
async fn test_older_schema_version_is_refused() {
    let store = TestStore::new().await;
    store.db.close().await;

    assert_matches!(
        store.reopen(CURRENT_SCHEMA_VERSION - 1).await,
        Err(SyncError::SchemaDowngrade { stored, requested })
            if stored == CURRENT_SCHEMA_VERSION && requested == CURRENT_SCHEMA_VERSION - 1
    );
}

#[tokio::test]
async fn test_stats_reflect_queue_and_rejections() {
    let store = TestStore::new().await;
    let first = store
        .db
        .enqueue(NewAction::delete(EntityKind::Task, "srv-1"))
        .await
        .unwrap();
    store
        .db
        .enqueue(NewAction::delete(EntityKind::Task, "srv-2"))
        .await
        .unwrap();
    store
        .db
        .reject_action(&first, Some(404), "not found")
        .await
        .unwrap();

    let stats = store.db.get_stats().await.unwrap();
    assert_eq!(stats.pending_actions, 1);
    assert_eq!(stats.rejected_actions, 1);
}
