//! Install, activate and request interception over real HTTP

use crate::common::{config_for, mount_static_assets, start_server, TestStore};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use taskapp_sync::network::{HttpRequest, HttpTransport};
use taskapp_sync::notifier::CompletionBroadcaster;
use taskapp_sync::shared::{SyncConfig, SyncError, TransportError};
use taskapp_sync::sync::NetworkMonitor;
use taskapp_sync::worker::SyncWorker;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn worker(config: &SyncConfig, store: &TestStore) -> SyncWorker<HttpTransport> {
    SyncWorker::new(
        config.clone(),
        store.db.clone(),
        HttpTransport::from_config(config).unwrap(),
        CompletionBroadcaster::detached(),
        NetworkMonitor::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_app_shell_served_after_server_goes_away() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());
    mount_static_assets(&server, &config.static_assets).await;

    let worker = worker(&config, &store);
    assert_eq!(worker.install().await.unwrap(), config.static_assets.len());
    assert!(worker.activate().await.unwrap().is_empty());

    let home = config.url_for("/home").unwrap();
    let settings = config.url_for("/settings").unwrap();
    drop(server);

    let page = worker.handle_fetch(HttpRequest::navigate(home)).await.unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.text(), "<html>/home</html>");

    // Never cached, so the offline page stands in
    let fallback = worker.handle_fetch(HttpRequest::navigate(settings.clone())).await.unwrap();
    assert_eq!(fallback.text(), "<html>/offline</html>");

    // Only navigations get the offline page
    assert_matches!(
        worker.handle_fetch(HttpRequest::get(settings)).await,
        Err(TransportError::Network(_))
    );
}

#[tokio::test]
async fn test_install_fails_when_an_asset_is_missing() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());

    let (missing, present) = config
        .static_assets
        .split_last()
        .expect("default manifest is not empty");
    mount_static_assets(&server, present).await;
    Mock::given(method("GET"))
        .and(path(missing.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let worker = worker(&config, &store);
    assert_matches!(worker.install().await, Err(SyncError::Install { .. }));

    // Nothing from the failed install is visible
    let cached = store
        .db
        .cache_match(&config.static_cache_name(), &HttpRequest::get(config.url_for("/").unwrap()).cache_key())
        .await
        .unwrap();
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_api_reads_fall_back_to_last_good_answer() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let config = config_for(&server, store.dir.path());

    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "srv-1", "name": "Cached" }])))
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker(&config, &store);
    let url = config.url_for("/api/tasks").unwrap();

    let live = worker.handle_fetch(HttpRequest::get(url.clone())).await.unwrap();
    let live: serde_json::Value = live.json().unwrap();
    drop(server);

    let cached = worker.handle_fetch(HttpRequest::get(url)).await.unwrap();
    assert_eq!(cached.json::<serde_json::Value>().unwrap(), live);
}

#[tokio::test]
async fn test_upgrade_evicts_previous_cache_version() {
    let server = start_server().await;
    let store = TestStore::new().await;
    let old = config_for(&server, store.dir.path());
    mount_static_assets(&server, &old.static_assets).await;

    worker(&old, &store).install().await.unwrap();

    let mut new = old.clone();
    new.cache_version = "v2".to_string();
    let upgraded = worker(&new, &store);
    upgraded.install().await.unwrap();

    let mut evicted = upgraded.activate().await.unwrap();
    evicted.sort();
    assert_eq!(evicted, vec![old.static_cache_name()]);

    let mut remaining = store.db.cache_names().await.unwrap();
    remaining.sort();
    assert_eq!(remaining, vec![new.static_cache_name()]);
}
