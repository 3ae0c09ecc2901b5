//! Checkpoint download from S3

use super::CheckpointDownloader;
use super::batch::{ArchiveBatchIterator, BatchDownloadIterator, BatchDownloader, normalize_prefix};
use crate::archive::ArchiveWriter;
use crate::error::{Error, ErrorAccumulator, Result};
use crate::storage::SessionFactory;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Streams every object under one checkpoint prefix into an archive
pub struct S3Downloader<'a> {
    writer: &'a mut dyn ArchiveWriter,
    sessions: Arc<dyn SessionFactory>,
    bucket: String,
    prefix: String,
    endpoint_url: Option<String>,
    fallback_region: String,
    part_size: u64,
    cancel: CancellationToken,
}

/// Everything an [`S3Downloader`] needs besides the checkpoint location
#[derive(Clone)]
pub struct S3DownloaderOptions {
    /// Opens region-scoped sessions
    pub sessions: Arc<dyn SessionFactory>,
    /// Region used for the bucket region lookup
    pub fallback_region: String,
    /// Size of each ranged read
    pub part_size: u64,
    /// Request cancellation
    pub cancel: CancellationToken,
}

impl<'a> S3Downloader<'a> {
    /// Download `bucket`/`prefix` into `writer`
    pub fn new(
        writer: &'a mut dyn ArchiveWriter,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        endpoint_url: Option<String>,
        options: S3DownloaderOptions,
    ) -> Self {
        Self {
            writer,
            sessions: options.sessions,
            bucket: bucket.into(),
            prefix: prefix.into(),
            endpoint_url,
            fallback_region: options.fallback_region,
            part_size: options.part_size,
            cancel: options.cancel,
        }
    }

    /// Bucket being read
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Checkpoint key prefix, without a trailing "/"
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T>> + Send,
    ) -> impl Future<Output = Result<T>> + Send {
        let cancel = self.cancel.clone();
        async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = fut => result,
            }
        }
    }
}

#[async_trait]
impl<'a> CheckpointDownloader for S3Downloader<'a> {
    async fn download(&mut self) -> Result<()> {
        let endpoint = self.endpoint_url.clone();

        // Region lookup and session setup happen before any byte is written.
        let probe = self
            .cancellable(self.sessions.connect(&self.fallback_region, endpoint.as_deref()))
            .await?;
        let region = self
            .cancellable(probe.bucket_region(&self.bucket))
            .await?;
        let store = self
            .cancellable(self.sessions.connect(&region, endpoint.as_deref()))
            .await?;
        tracing::debug!(bucket = %self.bucket, region = %region, "resolved bucket region");

        // Parts must arrive in offset order for the sequential writer.
        let downloader =
            BatchDownloader::new(store.clone(), self.part_size, self.cancel.clone())
                .with_concurrency(1);

        let prefix = normalize_prefix(&self.prefix);
        let mut errors = ErrorAccumulator::new();
        let mut token = None;
        let mut page = 0usize;

        loop {
            let listing = self
                .cancellable(store.list_objects(&self.bucket, &prefix, token.take()))
                .await;
            let listing = match listing {
                Ok(listing) => listing,
                Err(e) => {
                    errors.push(e);
                    break;
                }
            };
            tracing::debug!(page, objects = listing.objects.len(), "listed checkpoint page");

            let mut iter =
                ArchiveBatchIterator::new(&mut *self.writer, &self.bucket, &prefix, listing.objects);
            let result = downloader.download_with_iterator(&mut iter).await;
            if let Some(e) = iter.take_err() {
                errors.push(e);
            }
            if let Err(e) = result {
                errors.push(e);
            }

            if !errors.is_empty() {
                break;
            }
            match listing.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
            page += 1;
        }

        if !errors.is_empty() {
            tracing::error!(
                bucket = %self.bucket,
                prefix = %prefix,
                errors = errors.len(),
                "checkpoint download incomplete"
            );
        }
        errors.into_result()
    }
}
