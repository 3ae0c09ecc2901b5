//! Object store boundary
//!
//! The pipeline only needs three calls from a storage backend: the region a
//! bucket lives in, a paginated listing of `(key, size)` under a prefix, and
//! ranged reads. [`ObjectStore`] captures exactly that; [`SessionFactory`]
//! opens a store scoped to a region using ambient credentials.

pub mod memory;
pub mod s3;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

pub use memory::MemoryObjectStore;
pub use s3::{AwsSessionFactory, S3ObjectStore};

/// One object reported by a listing call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

/// One page of a listing
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    /// Objects on this page, in key order
    pub objects: Vec<ObjectEntry>,
    /// Token for the next page; `None` on the last page
    pub next_token: Option<String>,
}

/// Minimal object store API used by the checkpoint downloader
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Region the bucket lives in
    async fn bucket_region(&self, bucket: &str) -> Result<String>;

    /// List one page of objects under `prefix`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    /// Read `range` (end exclusive) of an object
    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes>;
}

/// Opens region-scoped object store sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a session in `region`, optionally against a custom endpoint
    async fn connect(
        &self,
        region: &str,
        endpoint_url: Option<&str>,
    ) -> Result<Arc<dyn ObjectStore>>;
}

/// Where a checkpoint's files are stored, as recorded in the experiment config
///
/// Only S3 can be streamed; the other kinds are recognized so requests for
/// them can be answered with a precise "unsupported" error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointStorageConfig {
    /// Amazon S3 or an S3-compatible store
    S3 {
        /// Bucket holding the checkpoints
        bucket: String,
        /// Key prefix under which checkpoint directories live
        #[serde(default)]
        prefix: Option<String>,
        /// Endpoint override for S3-compatible stores
        #[serde(default)]
        endpoint_url: Option<String>,
    },
    /// Google Cloud Storage
    Gcs {
        /// Bucket holding the checkpoints
        #[serde(default)]
        bucket: Option<String>,
        /// Key prefix
        #[serde(default)]
        prefix: Option<String>,
    },
    /// Azure Blob Storage
    Azure {
        /// Container holding the checkpoints
        #[serde(default)]
        container: Option<String>,
    },
    /// HDFS
    Hdfs {
        /// Namenode URL
        #[serde(default)]
        hdfs_url: Option<String>,
        /// Checkpoint directory
        #[serde(default)]
        hdfs_path: Option<String>,
    },
    /// A filesystem shared between agents
    SharedFs {
        /// Path on the host
        #[serde(default)]
        host_path: Option<String>,
        /// Sub-path under `host_path`
        #[serde(default)]
        storage_path: Option<String>,
    },
    /// Any storage type this build does not know about
    #[serde(other)]
    Unknown,
}

impl CheckpointStorageConfig {
    /// Storage type name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            CheckpointStorageConfig::S3 { .. } => "s3",
            CheckpointStorageConfig::Gcs { .. } => "gcs",
            CheckpointStorageConfig::Azure { .. } => "azure",
            CheckpointStorageConfig::Hdfs { .. } => "hdfs",
            CheckpointStorageConfig::SharedFs { .. } => "shared_fs",
            CheckpointStorageConfig::Unknown => "unknown",
        }
    }
}
