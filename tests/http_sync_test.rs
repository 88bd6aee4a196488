//! Sync passes against a mock HTTP server

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use propsync::client::engine::SyncEngine;
use propsync::client::local_db::LocalDatabase;
use propsync::client::sync::{NetworkStatus, MUTATION_ID_HEADER};
use propsync::shared::{MutationType, SyncStatus};

fn http_engine(server: &MockServer) -> SyncEngine {
    SyncEngine::builder(config_for(&server.uri()))
        .store(LocalDatabase::in_memory())
        .network_status(NetworkStatus::Online)
        .build()
}

#[tokio::test]
async fn test_every_type_reaches_its_endpoint() {
    let server = MockServer::start().await;
    for endpoint in [
        "/api/maintenance-requests",
        "/api/payments/proofs",
        "/api/chat/messages",
        "/api/announcements/read-receipts",
    ] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(header_exists(MUTATION_ID_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let engine = http_engine(&server);
    for mutation_type in MutationType::ALL {
        engine
            .enqueue(mutation_type, json!({"type": mutation_type.as_str()}))
            .await
            .unwrap();
    }

    let outcome = engine.sync_now().await.unwrap();
    assert_eq!(outcome.report().unwrap().synced, 4);

    wait_for_grace().await;
    assert_eq!(engine.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_server_error_marks_record_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/payments/proofs"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let engine = http_engine(&server);
    let id = engine
        .enqueue(MutationType::PaymentProof, json!({"amount": 640}))
        .await
        .unwrap();

    engine.sync_now().await.unwrap();

    let stored = engine.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Failed);
    assert_eq!(stored.retry_count, 1);
    assert!(stored.last_error.unwrap().contains("502"));
}

#[tokio::test]
async fn test_hung_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/messages"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let engine = http_engine(&server);
    let id = engine
        .enqueue(MutationType::ChatMessage, json!({"text": "anyone?"}))
        .await
        .unwrap();

    let outcome = engine.sync_now().await.unwrap();
    assert_eq!(outcome.report().unwrap().failed, 1);

    let stored = engine.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Failed);
    assert!(stored.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_unreachable_server_keeps_record_for_retry() {
    let engine = SyncEngine::builder(config_for(&closed_port_url()))
        .store(LocalDatabase::in_memory())
        .network_status(NetworkStatus::Online)
        .build();

    let id = engine
        .enqueue(MutationType::MaintenanceRequest, json!({"unit": "3F"}))
        .await
        .unwrap();
    engine.sync_now().await.unwrap();

    let stored = engine.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Failed);
    assert!(stored.last_error.unwrap().starts_with("network error"));
    assert_eq!(engine.stuck_count().await.unwrap(), 0);
    assert_eq!(engine.pending_count().await.unwrap(), 1);
}
