//! Integration tests using a mock Listrak server
//!
//! Tests the full flow: OAuth2 token → list discovery → per-list entity sync →
//! output messages and persisted state.

use listrak_sync::config::TapConfig;
use listrak_sync::engine::{SyncConfig, SyncEngine};
use listrak_sync::output::MemorySink;
use listrak_sync::selection;
use listrak_sync::state::{BookmarkKey, Checkpoint, StateManager, Watermark};
use listrak_sync::streams;
use listrak_sync::transport::ListrakClient;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const START: &str = "2024-01-01T00:00:00Z";

fn config(server: &MockServer) -> TapConfig {
    TapConfig::from_json(
        &json!({
            "client_id": "id",
            "client_secret": "secret",
            "start_date": START,
            "base_url": server.uri(),
            "token_url": format!("{}/OAuth2/Token", server.uri()),
            "http": {
                "requests_per_second": null,
                "max_retries": 1,
                "initial_backoff_ms": 1
            }
        })
        .to_string(),
    )
    .unwrap()
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/OAuth2/Token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_lists(server: &MockServer) {
    mount_page(
        server,
        "/List",
        json!({"data": [{"listId": 7, "listName": "b"}, {"listId": 3, "listName": "a"}]}),
    )
    .await;
}

async fn sync(
    server: &MockServer,
    streams: &[&str],
    state_path: &Path,
) -> (listrak_sync::Result<listrak_sync::SyncStats>, MemorySink) {
    let config = config(server);
    let selection =
        selection::resolve(streams.iter().copied(), &streams::dependency_table()).unwrap();
    let client = ListrakClient::new(&config).unwrap();
    let state = StateManager::from_file(state_path).unwrap();

    let mut engine = SyncEngine::new(client, state, SyncConfig::from_tap_config(&config));
    let mut sink = MemorySink::new();
    let result = engine.run(&selection, &mut sink).await;
    (result, sink)
}

// ============================================================================
// End-to-end sync
// ============================================================================

#[tokio::test]
async fn test_full_sync_writes_records_and_bookmarks() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_lists(&server).await;

    mount_page(&server, "/List/3/Campaign", json!({"data": [{"campaignId": 1}]})).await;
    mount_page(&server, "/List/7/Campaign", json!({"data": [{"campaignId": 2}]})).await;

    Mock::given(method("GET"))
        .and(path("/List/3/Contact"))
        .and(query_param("subscriptionState", "Subscribed"))
        .and(query_param("startDate", START))
        .and(query_param("cursor", "Start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"emailAddress": "a@x.com", "subscribeDate": "2024-02-01T00:00:00Z"},
                {"emailAddress": "b@x.com", "subscribeDate": "2024-03-05T10:00:00Z"}
            ],
            "nextPageCursor": "n1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/List/3/Contact"))
        .and(query_param("subscriptionState", "Subscribed"))
        .and(query_param("cursor", "n1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"emailAddress": "c@x.com", "subscribeDate": "2024-02-20T00:00:00Z"}],
            "nextPageCursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/List/3/Contact"))
        .and(query_param("subscriptionState", "Unsubscribed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    mount_page(&server, "/List/7/Contact", json!({"data": []})).await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let (result, sink) = sync(&server, &["campaigns", "contacts"], &state_path).await;
    let stats = result.unwrap();

    assert_eq!(sink.schema_streams(), vec!["campaigns", "contacts"]);
    assert!(sink.records("lists").is_empty());

    let campaigns = sink.records("campaigns");
    assert_eq!(campaigns.len(), 2);
    assert_eq!(campaigns[0]["listId"], json!(3));
    assert_eq!(campaigns[1]["listId"], json!(7));

    let contacts = sink.records("contacts");
    assert_eq!(contacts.len(), 3);
    assert!(contacts.iter().all(|c| c["listId"] == json!(3)));
    assert_eq!(stats.records_emitted, 5);

    let saved = StateManager::from_file(&state_path).unwrap();
    assert!(saved.checkpoint().is_clear());
    let key = BookmarkKey::scoped("contacts", ["3", "Subscribed"]);
    assert_eq!(
        saved.state().bookmarks.get_stored(&key).map(Watermark::as_str),
        Some("2024-03-05T10:00:00Z")
    );
    // List 7 had no contacts; its scope starts at the start date next time
    let empty = BookmarkKey::scoped("contacts", ["7", "Subscribed"]);
    assert_eq!(
        saved.state().bookmarks.get_stored(&empty).map(Watermark::as_str),
        Some(START)
    );
}

#[tokio::test]
async fn test_resume_skips_completed_work() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_lists(&server).await;

    Mock::given(method("GET"))
        .and(path("/List/3/Campaign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/List/7/Campaign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"campaignId": 9}]})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    std::fs::write(
        &state_path,
        serde_json::to_string(&json!({
            "bookmarks": {},
            "checkpoint": {"current_parent_id": "3", "current_entity_name": "campaigns"}
        }))
        .unwrap(),
    )
    .unwrap();

    let (result, sink) = sync(&server, &["campaigns"], &state_path).await;
    result.unwrap();

    let campaigns = sink.records("campaigns");
    assert_eq!(campaigns.len(), 1);
    assert_eq!(campaigns[0]["campaignId"], json!(9));

    let saved = StateManager::from_file(&state_path).unwrap();
    assert_eq!(saved.checkpoint(), &Checkpoint::default());
}

#[tokio::test]
async fn test_server_error_leaves_resumable_checkpoint() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_lists(&server).await;

    mount_page(&server, "/List/3/Campaign", json!({"data": [{"campaignId": 1}]})).await;
    Mock::given(method("GET"))
        .and(path("/List/7/Campaign"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let (result, sink) = sync(&server, &["campaigns"], &state_path).await;

    assert!(result.is_err());
    assert_eq!(sink.records("campaigns").len(), 1);

    let saved = StateManager::from_file(&state_path).unwrap();
    assert_eq!(saved.checkpoint(), &Checkpoint::in_parent("7"));
}

#[tokio::test]
async fn test_check_connection() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_lists(&server).await;

    ListrakClient::new(&config(&server))
        .unwrap()
        .check()
        .await
        .unwrap();
}
