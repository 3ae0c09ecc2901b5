//! Amazon S3 implementation of the object store boundary

use super::{ListPage, ObjectEntry, ObjectStore, SessionFactory};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use bytes::Bytes;
use std::ops::Range;
use std::sync::Arc;

/// Opens S3 clients using the ambient credential chain
#[derive(Clone, Debug, Default)]
pub struct AwsSessionFactory {
    endpoint_url: Option<String>,
    force_path_style: bool,
}

impl AwsSessionFactory {
    /// Create a factory from the storage section of the configuration
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            endpoint_url: config.endpoint_url.clone(),
            force_path_style: config.force_path_style,
        }
    }
}

#[async_trait]
impl SessionFactory for AwsSessionFactory {
    async fn connect(
        &self,
        region: &str,
        endpoint_url: Option<&str>,
    ) -> Result<Arc<dyn ObjectStore>> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        if sdk_config.credentials_provider().is_none() {
            return Err(StorageError::Session {
                region: region.to_string(),
                reason: "no credentials provider available".into(),
            }
            .into());
        }

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(self.force_path_style);
        if let Some(endpoint) = endpoint_url.or(self.endpoint_url.as_deref()) {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::debug!(region, endpoint = ?endpoint_url, "opened S3 session");
        Ok(Arc::new(S3ObjectStore::new(Client::from_conf(builder.build()))))
    }
}

/// [`ObjectStore`] backed by an `aws-sdk-s3` client
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| StorageError::Region {
                bucket: bucket.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let constraint = output
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .unwrap_or_default();
        Ok(normalize_bucket_region(&constraint))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| StorageError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectEntry {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                })
            })
            .collect();

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes> {
        let get_error = |reason: String| StorageError::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        if range.is_empty() {
            return Ok(Bytes::new());
        }

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes={}-{}", range.start, range.end - 1))
            .send()
            .await
            .map_err(|e| get_error(DisplayErrorContext(&e).to_string()))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| get_error(e.to_string()))?;
        Ok(body.into_bytes())
    }
}

/// Translate a `GetBucketLocation` constraint into a region name
///
/// Buckets in us-east-1 report an empty constraint; very old EU buckets
/// report the legacy name `EU`.
pub fn normalize_bucket_region(constraint: &str) -> String {
    match constraint {
        "" => "us-east-1".to_string(),
        "EU" => "eu-west-1".to_string(),
        region => region.to_string(),
    }
}
