//! End-to-end checkpoint streaming scenarios against the in-memory object
//! store and a temporary SQLite metadata database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use checkpoint_stream::db::NewCheckpoint;
use checkpoint_stream::storage::memory::StoreRequest;
use checkpoint_stream::{
    CheckpointArchiver, Config, Database, Error, MIME_APPLICATION_GZIP, MIME_APPLICATION_ZIP,
    MemoryObjectStore,
};
use serde_json::json;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Harness {
    archiver: CheckpointArchiver,
    db: Arc<Database>,
    store: MemoryObjectStore,
    _temp_dir: TempDir,
}

impl Harness {
    async fn new(store: MemoryObjectStore, config: Config) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Arc::new(
            Database::new(&temp_dir.path().join("meta.db"))
                .await
                .unwrap(),
        );
        let archiver = CheckpointArchiver::new(
            db.clone(),
            Arc::new(store.clone()),
            Arc::new(config),
        );
        Self {
            archiver,
            db,
            store,
            _temp_dir: temp_dir,
        }
    }

    async fn register(&self, id: Uuid, storage: serde_json::Value) {
        self.db
            .insert_checkpoint(&NewCheckpoint {
                uuid: id,
                experiment_config: json!({ "checkpoint_storage": storage }),
            })
            .await
            .unwrap();
    }

    async fn stream(&self, mime_type: &str, id: Uuid) -> (Vec<u8>, checkpoint_stream::Result<()>) {
        let mut out = Vec::new();
        let result = self
            .archiver
            .stream_checkpoint(mime_type, id, &mut out, CancellationToken::new())
            .await;
        (out, result)
    }
}

fn small_parts() -> Config {
    let mut config = Config::default();
    config.storage.part_size = 7;
    config
}

fn tar_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (entry.path().unwrap().to_string_lossy().into_owned(), data)
        })
        .collect()
}

fn count_gets(store: &MemoryObjectStore) -> usize {
    store
        .requests()
        .iter()
        .filter(|r| matches!(r, StoreRequest::Get { .. }))
        .count()
}

#[tokio::test]
async fn checkpoint_entries_are_relative_to_prefix_and_in_listing_order() {
    let id: Uuid = "6f1c2a3b-0000-4000-8000-000000000001".parse().unwrap();
    let store = MemoryObjectStore::new("us-east-1");
    store.put("bucket", &format!("{id}/a.txt"), &b"hello"[..]);
    store.put("bucket", &format!("{id}/sub/b.bin"), vec![1u8; 1024]);

    let harness = Harness::new(store, small_parts()).await;
    harness.register(id, json!({"type": "s3", "bucket": "bucket"})).await;

    let (out, result) = harness.stream(MIME_APPLICATION_GZIP, id).await;
    result.unwrap();

    let entries = tar_entries(&out);
    assert_eq!(
        entries,
        vec![
            ("a.txt".to_string(), b"hello".to_vec()),
            ("sub/b.bin".to_string(), vec![1u8; 1024]),
        ]
    );
}

#[tokio::test]
async fn multi_part_objects_keep_byte_order() {
    let id = Uuid::new_v4();
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let store = MemoryObjectStore::new("ap-south-1");
    store.put("b", &format!("exp/{id}/weights.bin"), payload.clone());

    let harness = Harness::new(store, small_parts()).await;
    harness
        .register(id, json!({"type": "s3", "bucket": "b", "prefix": "exp"}))
        .await;

    let (out, result) = harness.stream(MIME_APPLICATION_ZIP, id).await;
    result.unwrap();

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(out)).unwrap();
    let mut data = Vec::new();
    archive
        .by_name("weights.bin")
        .unwrap()
        .read_to_end(&mut data)
        .unwrap();
    assert_eq!(data, payload);
    assert_eq!(count_gets(&harness.store), 5000usize.div_ceil(7));
}

#[tokio::test]
async fn sibling_prefixes_are_not_included() {
    let id = Uuid::new_v4();
    let store = MemoryObjectStore::new("us-east-1");
    store.put("b", &format!("{id}/mine.txt"), &b"1"[..]);
    store.put("b", &format!("{id}-copy/theirs.txt"), &b"2"[..]);

    let harness = Harness::new(store, small_parts()).await;
    harness.register(id, json!({"type": "s3", "bucket": "b"})).await;

    let (out, result) = harness.stream(MIME_APPLICATION_GZIP, id).await;
    result.unwrap();

    let names: Vec<String> = tar_entries(&out).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["mine.txt".to_string()]);
}

#[tokio::test]
async fn unsupported_mime_type_makes_no_backend_calls() {
    let id = Uuid::new_v4();
    let harness = Harness::new(MemoryObjectStore::new("us-east-1"), small_parts()).await;
    harness.register(id, json!({"type": "s3", "bucket": "b"})).await;

    let (out, result) = harness.stream("text/plain", id).await;

    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    assert!(out.is_empty());
    assert!(harness.store.requests().is_empty());
    assert!(harness.store.connected_regions().is_empty());
}

#[tokio::test]
async fn unsupported_backend_names_the_kind_and_writes_nothing() {
    let id = Uuid::new_v4();
    let harness = Harness::new(MemoryObjectStore::new("us-east-1"), small_parts()).await;
    harness
        .register(id, json!({"type": "azure", "container": "c"}))
        .await;

    let (out, result) = harness.stream(MIME_APPLICATION_ZIP, id).await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("azure"));
    assert!(matches!(err, Error::UnsupportedBackend { .. }));
    assert!(out.is_empty());
}

#[tokio::test]
async fn second_page_failure_is_aggregated_after_first_page_streamed() {
    let id = Uuid::new_v4();
    let store = MemoryObjectStore::new("us-east-1").with_page_size(1);
    store.put("b", &format!("{id}/first.txt"), &b"first page"[..]);
    store.put("b", &format!("{id}/second.txt"), &b"second page"[..]);
    store.fail_get(&format!("{id}/second.txt"));

    let mut config = small_parts();
    config.archive.delay_bytes = 1;
    let harness = Harness::new(store, config).await;
    harness.register(id, json!({"type": "s3", "bucket": "b"})).await;

    let (out, result) = harness.stream(MIME_APPLICATION_ZIP, id).await;

    match result {
        Err(Error::Incomplete(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("expected aggregated failure, got {:?}", other),
    }

    // The first entry was already handed to the output before the failure
    let needle = b"first.txt";
    assert!(out.windows(needle.len()).any(|w| w == needle));
}

#[tokio::test]
async fn cancelled_request_fails() {
    let id = Uuid::new_v4();
    let store = MemoryObjectStore::new("us-east-1");
    store.put("b", &format!("{id}/a.txt"), &b"hello"[..]);

    let harness = Harness::new(store, small_parts()).await;
    harness.register(id, json!({"type": "s3", "bucket": "b"})).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut out = Vec::new();
    let result = harness
        .archiver
        .stream_checkpoint(MIME_APPLICATION_GZIP, id, &mut out, cancel)
        .await;

    assert!(result.is_err());
    assert_eq!(count_gets(&harness.store), 0);
}
