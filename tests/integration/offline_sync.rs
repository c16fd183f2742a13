//! Offline edits replayed against the server

use crate::common::{config_for, mount_create, received_json, start_server, TestStore};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use taskapp_sync::network::HttpTransport;
use taskapp_sync::notifier::{notifier_pair, CompletionBroadcaster};
use taskapp_sync::offline::OfflineManager;
use taskapp_sync::shared::{SyncState, TaskFields, TaskPatch};
use taskapp_sync::sync::{DrainTrigger, NetworkMonitor, NetworkStatus, SyncEngine};
use taskapp_sync::worker::SyncWorker;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn offline_manager(store: &TestStore) -> OfflineManager {
    let (foreground, _worker) = notifier_pair();
    OfflineManager::new(
        store.db.clone(),
        foreground,
        NetworkMonitor::new(NetworkStatus::Offline),
    )
}

#[tokio::test]
async fn test_offline_create_then_update_reconciles_to_server_id() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());

    mount_create(&server, json!({ "name": "Write report" }), "srv-789").await;
    Mock::given(method("PATCH"))
        .and(path("/api/tasks/srv-789"))
        .and(body_partial_json(json!({ "id": "srv-789", "completed": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "srv-789" })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = offline_manager(&store);
    let task = manager.create_task(TaskFields::named("Write report")).await.unwrap();
    manager
        .update_task(
            &task.id,
            TaskPatch {
                completed: Some(true),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();

    let engine = SyncEngine::new(
        store.db.clone(),
        HttpTransport::from_config(&config).unwrap(),
        &config,
        CompletionBroadcaster::detached(),
    )
    .unwrap();

    let report = engine.drain(DrainTrigger::Requested).await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.deferred, 0);

    // The create went out without the temporary id
    let creates = received_json(&server, "POST", "/api/tasks").await;
    assert_eq!(creates.len(), 1);
    assert!(creates[0].get("id").is_none());

    let tasks = manager.tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "srv-789");
    assert!(tasks[0].fields.completed);
    assert_eq!(tasks[0].sync_state, SyncState::Synced);
    assert_eq!(manager.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_refused_entry_does_not_block_the_rest() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());

    mount_create(&server, json!({ "name": "first" }), "srv-1").await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .and(body_partial_json(json!({ "name": "second" })))
        .respond_with(ResponseTemplate::new(422).set_body_string("name is reserved"))
        .expect(1)
        .mount(&server)
        .await;
    mount_create(&server, json!({ "name": "third" }), "srv-3").await;

    let manager = offline_manager(&store);
    manager.create_task(TaskFields::named("first")).await.unwrap();
    let refused = manager.create_task(TaskFields::named("second")).await.unwrap();
    manager.create_task(TaskFields::named("third")).await.unwrap();

    let engine = SyncEngine::new(
        store.db.clone(),
        HttpTransport::from_config(&config).unwrap(),
        &config,
        CompletionBroadcaster::detached(),
    )
    .unwrap();

    let report = engine.drain(DrainTrigger::Requested).await.unwrap();
    assert_eq!((report.applied, report.rejected, report.deferred), (2, 1, 0));
    assert_eq!(manager.pending_count().await.unwrap(), 0);

    let rejected = manager.rejected_actions().await.unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].status, Some(422));
    assert_eq!(rejected[0].reason, "name is reserved");
    assert_eq!(rejected[0].entity_id(), Some(refused.id.as_str()));

    // The refused task stays visible and unsynced until the user decides
    let kept = store.db.get_task(&refused.id).await.unwrap().unwrap();
    assert_eq!(kept.sync_state, SyncState::Dirty);

    manager.discard_rejected(rejected[0].id).await.unwrap();
    assert!(store.db.get_task(&refused.id).await.unwrap().is_none());
    assert!(manager.rejected_actions().await.unwrap().is_empty());

    let mut ids: Vec<String> = manager.tasks().await.unwrap().into_iter().map(|t| t.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["srv-1", "srv-3"]);
}

#[tokio::test]
async fn test_server_outage_keeps_entry_for_next_pass() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());

    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_create(&server, json!({ "name": "Retry me" }), "srv-42").await;

    let manager = offline_manager(&store);
    manager.create_task(TaskFields::named("Retry me")).await.unwrap();
    let before = store.db.drain_queue_snapshot().await.unwrap();

    let engine = SyncEngine::new(
        store.db.clone(),
        HttpTransport::from_config(&config).unwrap(),
        &config,
        CompletionBroadcaster::detached(),
    )
    .unwrap();

    let first = engine.drain(DrainTrigger::Requested).await.unwrap();
    assert_eq!((first.applied, first.deferred), (0, 1));
    assert_eq!(store.db.drain_queue_snapshot().await.unwrap(), before);
    assert!(manager.rejected_actions().await.unwrap().is_empty());

    let second = engine.drain(DrainTrigger::ConnectivityRestored).await.unwrap();
    assert_eq!(second.applied, 1);
    assert_eq!(manager.pending_count().await.unwrap(), 0);
    assert_eq!(manager.tasks().await.unwrap()[0].id, "srv-42");
}

#[tokio::test]
async fn test_unreachable_server_defers_everything() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());
    drop(server);

    let manager = offline_manager(&store);
    let task = manager.create_task(TaskFields::named("Nowhere to go")).await.unwrap();
    manager.delete_task(&task.id).await.unwrap();

    let engine = SyncEngine::new(
        store.db.clone(),
        HttpTransport::from_config(&config).unwrap(),
        &config,
        CompletionBroadcaster::detached(),
    )
    .unwrap();

    let report = engine.drain(DrainTrigger::Requested).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.deferred, 2);
    assert_eq!(manager.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_reconnect_round_trip_through_running_worker() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());

    mount_create(&server, json!({ "name": "Made on the train" }), "srv-100").await;

    let (foreground, endpoint) = notifier_pair();
    let (inbox, broadcaster) = endpoint.into_parts();
    let worker = SyncWorker::new(
        config.clone(),
        store.db.clone(),
        HttpTransport::from_config(&config).unwrap(),
        broadcaster,
        NetworkMonitor::default(),
    )
    .unwrap();
    let service = worker.start(inbox);

    let manager = OfflineManager::new(
        store.db.clone(),
        foreground,
        NetworkMonitor::new(NetworkStatus::Offline),
    );
    let mut completions = manager.subscribe();

    manager.create_task(TaskFields::named("Made on the train")).await.unwrap();
    assert!(manager.set_online(true));

    let completed = tokio::time::timeout(
        Duration::from_secs(10),
        OfflineManager::wait_for_sync_complete(&mut completions),
    )
    .await;
    assert_matches!(completed, Ok(true));

    let tasks = manager.tasks().await.unwrap();
    assert_eq!(tasks[0].id, "srv-100");
    assert_eq!(tasks[0].sync_state, SyncState::Synced);

    service.shutdown().await;
}
