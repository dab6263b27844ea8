use serde_json::json;
use std::time::Duration;
use stitchsync_sync::{
    ConnectivityProbe, HttpConnectivityProbe, HttpRemoteConfig, HttpRemoteStore, RemoteStore,
    SyncError,
};
use stitchsync_types::{Project, ProjectId, Timestamp, UserId};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> HttpRemoteStore {
    HttpRemoteStore::new(HttpRemoteConfig {
        base_url: server.uri(),
        auth_token: Some("token-123".to_string()),
        timeout_secs: 5,
    })
    .unwrap()
}

fn owner() -> UserId {
    UserId::new("alice@example.com")
}

const PROJECTS_PATH: &str = "/v1/users/alice%40example.com/projects";

// ── Config ──────────────────────────────────────────────────────

#[test]
fn http_config_default() {
    let cfg = HttpRemoteConfig::default();
    assert_eq!(cfg.base_url, "https://api.stitchsync.app");
    assert!(cfg.auth_token.is_none());
    assert_eq!(cfg.timeout_secs, 30);
}

#[test]
fn http_provider_name() {
    let store = HttpRemoteStore::new(HttpRemoteConfig::default()).unwrap();
    assert_eq!(store.provider_name(), "HTTP");
}

// ── Fetch ───────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_follows_pages() {
    let server = MockServer::start().await;
    let a = ProjectId::new();
    let b = ProjectId::new();

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{ "id": b.to_string(), "data": { "id": b.to_string(), "name": "B", "lastModified": 2 } }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{ "id": a.to_string(), "data": { "id": a.to_string(), "name": "A", "lastModified": 1 } }],
            "nextPageToken": "next"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let docs = store_for(&server).fetch_projects(&owner()).await.unwrap();

    let ids: Vec<_> = docs.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, vec![a.to_string(), b.to_string()]);
    assert_eq!(docs[0].decode().unwrap().name, "A");
}

#[tokio::test]
async fn fetch_missing_collection_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let docs = store_for(&server).fetch_projects(&owner()).await.unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn fetch_forbidden_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("missing permission"))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_projects(&owner()).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(ref msg) if msg.contains("missing permission")));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn fetch_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_projects(&owner()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn fetch_garbage_body_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_projects(&owner()).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
}

// ── Put ─────────────────────────────────────────────────────────

#[tokio::test]
async fn put_sends_camel_case_document() {
    let server = MockServer::start().await;
    let project = Project::with_timestamp(ProjectId::new(), "Socks", Timestamp::from_millis(42));

    Mock::given(method("PUT"))
        .and(path(format!("{PROJECTS_PATH}/{}", project.id)))
        .and(body_json(json!({
            "id": project.id.to_string(),
            "name": "Socks",
            "lastModified": 42,
            "content": {}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server).put_project(&owner(), &project).await.unwrap();
}

#[tokio::test]
async fn put_bad_request_is_storage_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .put_project(&owner(), &Project::new("Hat"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Storage(_)));
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let store = HttpRemoteStore::new(HttpRemoteConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        auth_token: None,
        timeout_secs: 2,
    })
    .unwrap();

    let err = store.fetch_projects(&owner()).await.unwrap_err();
    assert!(err.is_retryable());
}

// ── Probe ───────────────────────────────────────────────────────

#[tokio::test]
async fn probe_reports_health_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let probe = HttpConnectivityProbe::new(&server.uri(), Duration::from_secs(2)).unwrap();
    assert!(probe.probe().await.unwrap());
}

#[tokio::test]
async fn probe_unhealthy_status_is_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let probe = HttpConnectivityProbe::new(&server.uri(), Duration::from_secs(2)).unwrap();
    assert!(!probe.probe().await.unwrap());
}
