//! Checkpoint archive dispatcher
//!
//! Ties the pieces together for one request: validate the requested format,
//! resolve the checkpoint's storage, build the archive writer on top of the
//! output, run the backend downloader and finally close the writer.

use crate::archive::{ArchiveWriter, build_writer_pipeline};
use crate::config::Config;
use crate::downloader::{S3DownloaderOptions, new_downloader};
use crate::error::{Error, Result};
use crate::metadata::{CheckpointMetadata, checkpoint_storage_config};
use crate::storage::SessionFactory;
use crate::types::ArchiveFormat;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Streams checkpoints as archives
#[derive(Clone)]
pub struct CheckpointArchiver {
    metadata: Arc<dyn CheckpointMetadata>,
    sessions: Arc<dyn SessionFactory>,
    config: Arc<Config>,
}

impl CheckpointArchiver {
    /// Create an archiver reading metadata from `metadata` and objects through `sessions`
    pub fn new(
        metadata: Arc<dyn CheckpointMetadata>,
        sessions: Arc<dyn SessionFactory>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            metadata,
            sessions,
            config,
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stream checkpoint `id` into `output` as an archive of type `mime_type`
    ///
    /// Fails before writing anything when the MIME type is not supported, the
    /// checkpoint does not exist, its metadata is unreadable or its storage
    /// backend cannot be streamed. Failures after that point leave whatever
    /// was already written in `output`.
    pub async fn stream_checkpoint<O>(
        &self,
        mime_type: &str,
        id: Uuid,
        output: O,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        O: AsyncWrite + Unpin + Send,
    {
        let span = tracing::info_span!("checkpoint_download", checkpoint_id = %id, mime_type);
        let result = self
            .stream_checkpoint_inner(mime_type, id, output, cancel)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match &result {
            Ok(()) => tracing::info!("checkpoint download complete"),
            Err(e) => tracing::error!(error = %e, "checkpoint download failed"),
        });
        result
    }

    async fn stream_checkpoint_inner<O>(
        &self,
        mime_type: &str,
        id: Uuid,
        output: O,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        O: AsyncWrite + Unpin + Send,
    {
        let format = ArchiveFormat::from_mime_type(mime_type)
            .ok_or_else(|| Error::UnsupportedFormat(mime_type.to_string()))?;

        let storage = checkpoint_storage_config(self.metadata.as_ref(), id).await?;
        tracing::info!(storage_type = storage.kind(), "resolved checkpoint storage");

        let mut writer = build_writer_pipeline(output, format, &self.config.archive);
        let options = S3DownloaderOptions {
            sessions: Arc::clone(&self.sessions),
            fallback_region: self.config.storage.fallback_region.clone(),
            part_size: self.config.storage.part_size,
            cancel: cancel.clone(),
        };

        {
            let mut downloader = new_downloader(&storage, &mut writer, &id.to_string(), options)?;
            match self.config.download_timeout {
                Some(limit) => match tokio::time::timeout(limit, downloader.download()).await {
                    Ok(result) => result?,
                    Err(_) => {
                        cancel.cancel();
                        return Err(Error::Timeout(limit));
                    }
                },
                None => downloader.download().await?,
            }
        }

        writer.close().await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::StoreRequest;
    use crate::storage::{MemoryObjectStore, ObjectStore};
    use crate::types::{MIME_APPLICATION_GZIP, MIME_APPLICATION_ZIP};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Read;
    use std::time::Duration;

    struct FixedMetadata(HashMap<Uuid, serde_json::Value>);

    #[async_trait]
    impl CheckpointMetadata for FixedMetadata {
        async fn experiment_config(&self, id: Uuid) -> Result<Option<serde_json::Value>> {
            Ok(self.0.get(&id).cloned())
        }
    }

    fn archiver(id: Uuid, storage: serde_json::Value, store: &MemoryObjectStore) -> CheckpointArchiver {
        let metadata = FixedMetadata(HashMap::from([(id, json!({"checkpoint_storage": storage}))]));
        let mut config = Config::default();
        config.archive.delay_bytes = 64;
        config.storage.part_size = 3;
        CheckpointArchiver::new(Arc::new(metadata), Arc::new(store.clone()), Arc::new(config))
    }

    fn store_with_checkpoint(id: Uuid) -> MemoryObjectStore {
        let store = MemoryObjectStore::new("us-east-2");
        store.put("ckpts", &format!("exp/{id}/a.txt"), &b"hello"[..]);
        store.put("ckpts", &format!("exp/{id}/sub/b.bin"), vec![9u8; 1024]);
        store
    }

    #[tokio::test]
    async fn streams_tar_gz_with_relative_entries() {
        let id = Uuid::new_v4();
        let store = store_with_checkpoint(id);
        let archiver = archiver(id, json!({"type": "s3", "bucket": "ckpts", "prefix": "exp"}), &store);

        let mut out = Vec::new();
        archiver
            .stream_checkpoint(MIME_APPLICATION_GZIP, id, &mut out, CancellationToken::new())
            .await
            .unwrap();

        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(&out[..]));
        let mut entries = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            entries.push((entry.path().unwrap().to_string_lossy().into_owned(), data.len()));
        }
        assert_eq!(
            entries,
            vec![("a.txt".to_string(), 5), ("sub/b.bin".to_string(), 1024)]
        );
    }

    #[tokio::test]
    async fn streams_zip() {
        let id = Uuid::new_v4();
        let store = store_with_checkpoint(id);
        let archiver = archiver(id, json!({"type": "s3", "bucket": "ckpts", "prefix": "exp"}), &store);

        let mut out = Vec::new();
        archiver
            .stream_checkpoint(MIME_APPLICATION_ZIP, id, &mut out, CancellationToken::new())
            .await
            .unwrap();

        let archive = zip::ZipArchive::new(std::io::Cursor::new(out)).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert!(names.contains(&"a.txt"));
        assert!(names.contains(&"sub/b.bin"));
    }

    #[tokio::test]
    async fn unsupported_mime_type_touches_nothing() {
        let id = Uuid::new_v4();
        let store = store_with_checkpoint(id);
        let archiver = archiver(id, json!({"type": "s3", "bucket": "ckpts"}), &store);

        let mut out = Vec::new();
        let err = archiver
            .stream_checkpoint("text/plain", id, &mut out, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedFormat(ref m) if m == "text/plain"));
        assert!(out.is_empty());
        assert!(store.requests().is_empty());
        assert!(store.connected_regions().is_empty());
    }

    #[tokio::test]
    async fn unsupported_backend_writes_nothing() {
        let id = Uuid::new_v4();
        let store = store_with_checkpoint(id);
        let archiver = archiver(id, json!({"type": "gcs", "bucket": "b"}), &store);

        let mut out = Vec::new();
        let err = archiver
            .stream_checkpoint(MIME_APPLICATION_GZIP, id, &mut out, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedBackend { ref kind } if kind == "gcs"));
        assert!(out.is_empty());
        assert!(store.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_checkpoint_is_not_found() {
        let store = MemoryObjectStore::new("us-east-1");
        let archiver = archiver(Uuid::new_v4(), json!({"type": "s3", "bucket": "b"}), &store);

        let mut out = Vec::new();
        let err = archiver
            .stream_checkpoint(MIME_APPLICATION_ZIP, Uuid::new_v4(), &mut out, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CheckpointNotFound(_)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn prefix_without_storage_prefix_is_the_id() {
        let id = Uuid::new_v4();
        let store = MemoryObjectStore::new("us-east-1");
        store.put("ckpts", &format!("{id}/model.pt"), &b"weights"[..]);
        let archiver = archiver(id, json!({"type": "s3", "bucket": "ckpts"}), &store);

        let mut out = Vec::new();
        archiver
            .stream_checkpoint(MIME_APPLICATION_GZIP, id, &mut out, CancellationToken::new())
            .await
            .unwrap();

        assert!(store.requests().iter().any(|r| matches!(
            r,
            StoreRequest::List { prefix, .. } if *prefix == format!("{id}/")
        )));
    }

    /// Session factory whose connections never complete
    struct StalledSessions;

    #[async_trait]
    impl SessionFactory for StalledSessions {
        async fn connect(
            &self,
            _region: &str,
            _endpoint_url: Option<&str>,
        ) -> Result<Arc<dyn ObjectStore>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Arc::new(MemoryObjectStore::new("us-east-1")))
        }
    }

    #[tokio::test]
    async fn download_deadline_times_out_and_cancels() {
        let id = Uuid::new_v4();
        let metadata = FixedMetadata(HashMap::from([(
            id,
            json!({"checkpoint_storage": {"type": "s3", "bucket": "ckpts"}}),
        )]));
        let mut config = Config::default();
        config.download_timeout = Some(Duration::from_millis(1));
        let archiver =
            CheckpointArchiver::new(Arc::new(metadata), Arc::new(StalledSessions), Arc::new(config));

        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            archiver.stream_checkpoint(MIME_APPLICATION_GZIP, id, &mut out, cancel.clone()),
        )
        .await
        .expect("deadline must fire well before the stalled connect finishes")
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(1)));
        assert!(cancel.is_cancelled());
        assert!(out.is_empty());
    }
}
