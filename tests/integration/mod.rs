//! Integration tests against a mock server

mod offline_sync;
mod store;
mod worker_lifecycle;
