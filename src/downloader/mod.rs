//! Checkpoint downloaders split into focused submodules.
//!
//! - [`seq_writer`] - Offset-addressed writes forced into sequential order
//! - [`batch`] - Per-page listing iteration and ranged object downloads
//! - [`s3`] - Region discovery, paging and error aggregation for S3

pub mod batch;
pub mod s3;
pub mod seq_writer;

pub use batch::{ArchiveBatchIterator, BatchDownloadIterator, BatchDownloadObject, BatchDownloader};
pub use s3::{S3Downloader, S3DownloaderOptions};
pub use seq_writer::{OrderingViolation, SeqWriterAt, WriterAt};

use crate::archive::ArchiveWriter;
use crate::error::{Error, Result};
use crate::storage::CheckpointStorageConfig;
use async_trait::async_trait;

/// Streams one checkpoint into an archive writer
#[async_trait]
pub trait CheckpointDownloader: Send {
    /// Download every file of the checkpoint
    async fn download(&mut self) -> Result<()>;
}

/// Key prefix of a checkpoint: `<storage prefix>/<checkpoint id>` without leading "/"
pub fn checkpoint_prefix(storage_prefix: Option<&str>, checkpoint_id: &str) -> String {
    format!("{}/{}", storage_prefix.unwrap_or_default(), checkpoint_id)
        .trim_start_matches('/')
        .to_string()
}

/// Pick the downloader for the checkpoint's storage backend
///
/// Only S3 is supported; every other backend yields
/// [`Error::UnsupportedBackend`] before anything is written.
pub fn new_downloader<'a>(
    storage: &CheckpointStorageConfig,
    writer: &'a mut dyn ArchiveWriter,
    checkpoint_id: &str,
    options: S3DownloaderOptions,
) -> Result<Box<dyn CheckpointDownloader + 'a>> {
    match storage {
        CheckpointStorageConfig::S3 {
            bucket,
            prefix,
            endpoint_url,
        } => Ok(Box::new(S3Downloader::new(
            writer,
            bucket.clone(),
            checkpoint_prefix(prefix.as_deref(), checkpoint_id),
            endpoint_url.clone(),
            options,
        ))),
        other => Err(Error::UnsupportedBackend {
            kind: other.kind().to_string(),
        }),
    }
}
