//! In-memory object store
//!
//! Behaves like a single-region S3 with configurable page size. Every call is
//! recorded so callers can assert on exactly which requests were made, and
//! failures can be injected per key, per listing page, for region lookups and
//! for session creation.

use super::{ListPage, ObjectEntry, ObjectStore, SessionFactory};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

/// A request received by a [`MemoryObjectStore`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreRequest {
    /// Region lookup for a bucket
    BucketRegion {
        /// Bucket looked up
        bucket: String,
    },
    /// One listing page
    List {
        /// Bucket listed
        bucket: String,
        /// Prefix listed
        prefix: String,
        /// Continuation token sent
        token: Option<String>,
    },
    /// One ranged read
    Get {
        /// Bucket read from
        bucket: String,
        /// Key read
        key: String,
        /// Byte range read (end exclusive)
        range: Range<u64>,
    },
}

#[derive(Default)]
struct State {
    region: String,
    page_size: usize,
    objects: BTreeMap<(String, String), Bytes>,
    requests: Vec<StoreRequest>,
    connected_regions: Vec<String>,
    list_calls: usize,
    failing_keys: HashSet<String>,
    failing_list_page: Option<usize>,
    fail_region: bool,
    fail_connect: bool,
}

/// Thread-safe in-memory [`ObjectStore`] and [`SessionFactory`]
#[derive(Clone)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<State>>,
}

impl MemoryObjectStore {
    /// Create an empty store whose buckets all live in `region`
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                region: region.into(),
                page_size: 1000,
                ..State::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Limit how many objects a listing page returns
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state().page_size = page_size.max(1);
        self
    }

    /// Store an object
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.state()
            .objects
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    /// Make every read of `key` fail
    pub fn fail_get(&self, key: &str) {
        self.state().failing_keys.insert(key.to_string());
    }

    /// Make the `page`-th listing call (0-based, counted across prefixes) fail
    pub fn fail_list_page(&self, page: usize) {
        self.state().failing_list_page = Some(page);
    }

    /// Make bucket region lookups fail
    pub fn fail_region(&self) {
        self.state().fail_region = true;
    }

    /// Make session creation fail
    pub fn fail_connect(&self) {
        self.state().fail_connect = true;
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<StoreRequest> {
        self.state().requests.clone()
    }

    /// Regions sessions were opened in, in order
    pub fn connected_regions(&self) -> Vec<String> {
        self.state().connected_regions.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let mut state = self.state();
        state.requests.push(StoreRequest::BucketRegion {
            bucket: bucket.to_string(),
        });
        if state.fail_region {
            return Err(StorageError::Region {
                bucket: bucket.to_string(),
                reason: "access denied".into(),
            }
            .into());
        }
        Ok(state.region.clone())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut state = self.state();
        state.requests.push(StoreRequest::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            token: continuation_token.clone(),
        });

        let page = state.list_calls;
        state.list_calls += 1;
        if state.failing_list_page == Some(page) {
            return Err(StorageError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                reason: format!("injected failure on page {page}"),
            }
            .into());
        }

        // The continuation token is the last key of the previous page.
        let mut matching = state
            .objects
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .filter(|((_, key), _)| {
                continuation_token
                    .as_deref()
                    .is_none_or(|after| key.as_str() > after)
            })
            .map(|((_, key), data)| ObjectEntry {
                key: key.clone(),
                size: data.len() as u64,
            });

        let objects: Vec<_> = matching.by_ref().take(state.page_size).collect();
        let next_token = if matching.next().is_some() {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes> {
        let mut state = self.state();
        state.requests.push(StoreRequest::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
            range: range.clone(),
        });

        let get_error = |reason: &str| StorageError::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if state.failing_keys.contains(key) {
            return Err(get_error("connection reset by peer").into());
        }
        let data = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| get_error("NoSuchKey"))?;

        let end = range.end.min(data.len() as u64);
        if range.start > end {
            return Err(get_error("InvalidRange").into());
        }
        Ok(data.slice(range.start as usize..end as usize))
    }
}

#[async_trait]
impl SessionFactory for MemoryObjectStore {
    async fn connect(
        &self,
        region: &str,
        _endpoint_url: Option<&str>,
    ) -> Result<Arc<dyn ObjectStore>> {
        let mut state = self.state();
        state.connected_regions.push(region.to_string());
        if state.fail_connect {
            return Err(StorageError::Session {
                region: region.to_string(),
                reason: "no credentials".into(),
            }
            .into());
        }
        drop(state);
        Ok(Arc::new(self.clone()))
    }
}
