//! Mock server helpers for integration tests
//!
//! The remote API and the app shell are served by a `wiremock` server;
//! everything under test talks to it through the real `reqwest` transport.

use serde_json::Value;
use taskapp_sync::shared::SyncConfig;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A dedicated server that stops listening when dropped
///
/// `MockServer::start` hands out pooled servers that keep answering after
/// being dropped; tests that simulate an outage need the real thing.
pub async fn start_server() -> MockServer {
    MockServer::builder().start().await
}

/// Configuration pointing at `server`, with the store under `dir`
pub fn config_for(server: &MockServer, dir: &std::path::Path) -> SyncConfig {
    SyncConfig::builder()
        .server_url(server.uri())
        .database_path(dir.join("local.db"))
        .request_timeout_secs(5)
        .build()
        .expect("Failed to build config")
}

/// Answer a create whose body contains `matching` with a record carrying `server_id`
pub async fn mount_create(server: &MockServer, matching: Value, server_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .and(body_partial_json(matching))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": server_id })))
        .expect(1)
        .mount(server)
        .await;
}

/// Serve every app shell route with a small HTML body
pub async fn mount_static_assets(server: &MockServer, routes: &[String]) {
    for route in routes {
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(format!("<html>{}</html>", route)),
            )
            .mount(server)
            .await;
    }
}

/// JSON bodies of every request the server saw for `method_name` on `route`
pub async fn received_json(server: &MockServer, method_name: &str, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == method_name && request.url.path() == route)
        .map(|request| request.body_json::<Value>().unwrap_or(Value::Null))
        .collect()
}
