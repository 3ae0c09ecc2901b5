//! Batch listing iteration and ranged object downloads

use super::seq_writer::{SeqWriterAt, WriterAt};
use crate::archive::ArchiveWriter;
use crate::error::{Error, Result, StorageError};
use crate::storage::{ObjectEntry, ObjectStore};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::io;
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Parallel part downloads per object when not configured otherwise
pub const DEFAULT_CONCURRENCY: usize = 5;

/// One object to fetch and where to put it
pub struct BatchDownloadObject<'a> {
    /// Bucket holding the object
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Size reported by the listing
    pub size: u64,
    /// Destination for the object's bytes
    pub writer: SeqWriterAt<'a>,
}

/// Source of objects for [`BatchDownloader::download_with_iterator`]
#[async_trait]
pub trait BatchDownloadIterator: Send {
    /// Advance to the next object; `false` when exhausted or after an error
    async fn next(&mut self) -> bool;

    /// Error that stopped iteration, if any
    fn take_err(&mut self) -> Option<Error>;

    /// The current object; `None` before the first `next` or after the end
    fn download_object(&mut self) -> Option<BatchDownloadObject<'_>>;
}

/// Iterates one listing page, declaring an archive entry for every object
///
/// Entry paths are keys with the prefix stripped. The prefix always ends
/// with "/", so paths never start with one. Keys outside the prefix, and the
/// prefix's own directory marker, are skipped.
pub struct ArchiveBatchIterator<'a> {
    writer: &'a mut dyn ArchiveWriter,
    bucket: String,
    prefix: String,
    objects: Vec<ObjectEntry>,
    pos: Option<usize>,
    err: Option<Error>,
}

impl<'a> ArchiveBatchIterator<'a> {
    /// Iterate `objects` listed from `bucket` under `prefix`
    pub fn new(
        writer: &'a mut dyn ArchiveWriter,
        bucket: &str,
        prefix: &str,
        objects: Vec<ObjectEntry>,
    ) -> Self {
        Self {
            writer,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
            objects,
            pos: None,
            err: None,
        }
    }

    /// Prefix stripped from keys, always ending with "/"
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn current(&self) -> Option<&ObjectEntry> {
        self.objects.get(self.pos?)
    }
}

#[async_trait]
impl<'a> BatchDownloadIterator for ArchiveBatchIterator<'a> {
    async fn next(&mut self) -> bool {
        loop {
            let pos = self.pos.map_or(0, |p| p + 1);
            self.pos = Some(pos);
            let Some(object) = self.objects.get(pos) else {
                return false;
            };

            let path = match object.key.strip_prefix(&self.prefix) {
                Some(path) if !path.is_empty() && !path.starts_with('/') => path,
                _ => {
                    tracing::warn!(
                        key = %object.key,
                        prefix = %self.prefix,
                        "skipping object outside of checkpoint prefix or with an absolute name"
                    );
                    continue;
                }
            };

            if let Err(source) = self.writer.write_header(path, object.size).await {
                self.err = Some(Error::Archive {
                    path: path.to_string(),
                    source,
                });
                return false;
            }
            return true;
        }
    }

    fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }

    fn download_object(&mut self) -> Option<BatchDownloadObject<'_>> {
        let object = self.current()?.clone();
        Some(BatchDownloadObject {
            bucket: self.bucket.clone(),
            key: object.key,
            size: object.size,
            writer: SeqWriterAt::new(&mut *self.writer),
        })
    }
}

/// Ensure a non-empty prefix ends with "/"
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Downloads objects in ranged parts and hands each part to a [`WriterAt`]
///
/// Parts are fetched with up to `concurrency` requests in flight and written
/// in completion order. Only a concurrency of one guarantees that order is
/// also offset order.
#[derive(Clone)]
pub struct BatchDownloader {
    store: Arc<dyn ObjectStore>,
    part_size: u64,
    concurrency: usize,
    cancel: CancellationToken,
}

impl BatchDownloader {
    /// Create a downloader reading from `store`
    pub fn new(store: Arc<dyn ObjectStore>, part_size: u64, cancel: CancellationToken) -> Self {
        Self {
            store,
            part_size: part_size.max(1),
            concurrency: DEFAULT_CONCURRENCY,
            cancel,
        }
    }

    /// Set how many part requests may be in flight at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Download every object the iterator yields, stopping at the first failure
    pub async fn download_with_iterator(
        &self,
        iter: &mut dyn BatchDownloadIterator,
    ) -> Result<()> {
        while iter.next().await {
            let Some(mut object) = iter.download_object() else {
                break;
            };
            self.download(&object.bucket, &object.key, object.size, &mut object.writer)
                .await?;
        }
        Ok(())
    }

    /// Download one object of `size` bytes into `writer`
    pub async fn download(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        writer: &mut dyn WriterAt,
    ) -> Result<u64> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let store = &self.store;
        let mut parts = stream::iter(part_ranges(size, self.part_size))
            .map(|range| async move {
                let offset = range.start;
                let data = store.get_range(bucket, key, range).await?;
                Ok::<_, Error>((offset, data))
            })
            .buffer_unordered(self.concurrency);

        let mut written = 0u64;
        loop {
            let part = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                part = parts.next() => part,
            };
            let Some(part) = part else {
                break;
            };
            let (offset, data) = part?;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                result = write_part(writer, &data, offset) => {
                    result.map_err(|source| StorageError::Write {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        source,
                    })?;
                }
            }
            written += data.len() as u64;
        }

        if written != size {
            return Err(StorageError::SizeMismatch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                expected: size,
                actual: written,
            }
            .into());
        }

        tracing::debug!(bucket, key, bytes = written, "downloaded object");
        Ok(written)
    }
}

async fn write_part(writer: &mut dyn WriterAt, data: &[u8], offset: u64) -> io::Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let n = writer.write_at(&data[pos..], offset + pos as u64).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "archive accepted no bytes",
            ));
        }
        pos += n;
    }
    Ok(())
}

/// Split `0..size` into consecutive ranges of at most `part_size` bytes
pub fn part_ranges(size: u64, part_size: u64) -> Vec<Range<u64>> {
    let part_size = part_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < size {
        let end = size.min(start + part_size);
        ranges.push(start..end);
        start = end;
    }
    ranges
}
