use super::*;
use crate::Config;
use crate::db::{Database, NewCheckpoint};
use crate::storage::MemoryObjectStore;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

mod system;

/// Test fixture: a router over a temp SQLite metadata store and an in-memory object store
struct TestApp {
    router: Router,
    db: Arc<Database>,
    store: MemoryObjectStore,
    _temp_dir: TempDir,
}

impl TestApp {
    async fn new(store: MemoryObjectStore) -> Self {
        Self::with_config(store, test_config()).await
    }

    async fn with_config(store: MemoryObjectStore, config: Config) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Arc::new(
            Database::new(&temp_dir.path().join("checkpoints.db"))
                .await
                .unwrap(),
        );
        let config = Arc::new(config);
        let archiver = Arc::new(CheckpointArchiver::new(
            db.clone(),
            Arc::new(store.clone()),
            config.clone(),
        ));

        Self {
            router: create_router(archiver, config),
            db,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Register a checkpoint whose experiment config points at `storage`
    async fn register(&self, id: Uuid, storage: serde_json::Value) {
        self.db
            .insert_checkpoint(&NewCheckpoint {
                uuid: id,
                experiment_config: json!({ "checkpoint_storage": storage }),
            })
            .await
            .unwrap();
    }

    async fn get(&self, uri: &str) -> axum::response::Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.part_size = 4;
    config.archive.delay_bytes = 1;
    config
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let mut config = test_config();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let temp_dir = tempfile::tempdir().unwrap();
    let db = Database::new(&temp_dir.path().join("checkpoints.db"))
        .await
        .unwrap();
    let archiver = Arc::new(CheckpointArchiver::new(
        Arc::new(db),
        Arc::new(MemoryObjectStore::new("us-east-1")),
        config.clone(),
    ));

    let api_handle = tokio::spawn(start_api_server(archiver, config));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be running");

    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = TestApp::new(MemoryObjectStore::new("us-east-1")).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers().contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let mut config = test_config();
    config.api.cors_enabled = false;
    let app = TestApp::with_config(MemoryObjectStore::new("us-east-1"), config).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}

#[test]
fn test_cors_specific_origins() {
    // Unparseable origins are dropped rather than rejected
    let _layer = build_cors_layer(&[
        "http://localhost:3000".to_string(),
        "not a header\n".to_string(),
    ]);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new(MemoryObjectStore::new("us-east-1")).await;
    let response = app.get("/checkpoints").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_server_stops_on_shutdown_signal() {
    let mut config = test_config();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let temp_dir = tempfile::tempdir().unwrap();
    let db = Database::new(&temp_dir.path().join("checkpoints.db"))
        .await
        .unwrap();
    let archiver = Arc::new(CheckpointArchiver::new(
        Arc::new(db),
        Arc::new(MemoryObjectStore::new("us-east-1")),
        config.clone(),
    ));

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_with_shutdown(archiver, config, async move {
        let _ = rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
