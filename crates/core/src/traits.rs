//! ObjectStore trait definition
//!
//! This trait defines the interface for S3-compatible storage operations.
//! It decouples the handlers from the specific S3 SDK implementation.
//! Every call names its bucket explicitly; the notion of a mounted bucket
//! belongs to [`crate::ObjectStoreHandler`].

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::acl::{AccessControlList, Grant};
use crate::error::Result;

/// Metadata for an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,

    /// Size in bytes
    pub size_bytes: i64,

    /// Human-readable size
    pub size_human: String,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// ETag (usually MD5 for single-part uploads)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Storage class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// SHA-256 recorded at upload time, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ObjectInfo {
    /// Create a new ObjectInfo with only key and size known
    pub fn new(key: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            size_bytes: size,
            size_human: humansize::format_size(size.max(0) as u64, humansize::BINARY),
            last_modified: None,
            etag: None,
            storage_class: None,
            content_type: None,
            checksum: None,
        }
    }

    /// Whether the key is a folder marker
    pub fn is_folder_marker(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    /// Objects in this page, in key order
    pub objects: Vec<ObjectInfo>,

    /// Token for the next page; `None` on the last page
    pub next_continuation_token: Option<String>,
}

/// Options for a single listing request
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum number of keys to return per request
    pub max_keys: Option<i32>,

    /// Prefix to filter by
    pub prefix: Option<String>,

    /// Continuation token for pagination
    pub continuation_token: Option<String>,
}

/// Trait for S3-compatible storage operations
///
/// Errors follow the crate taxonomy: a missing bucket is
/// [`crate::Error::BucketNotFound`], a missing key
/// [`crate::Error::RemoteObjectNotFound`], a refused request
/// [`crate::Error::AccessDenied`], and connectivity problems
/// [`crate::Error::BackendUnavailable`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List bucket names visible to the credentials
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Check that a bucket exists and is accessible
    async fn head_bucket(&self, bucket: &str) -> Result<()>;

    /// Fetch one page of objects
    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ObjectPage>;

    /// Get object metadata
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo>;

    /// Upload a local file, streaming it from disk
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: HashMap<String, String>,
    ) -> Result<ObjectInfo>;

    /// Download an object into a local file, replacing it
    async fn get_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<ObjectInfo>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Get the bucket ACL
    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList>;

    /// Get an object ACL
    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList>;

    /// Replace the bucket ACL with the given grants
    async fn put_bucket_acl(&self, bucket: &str, grants: Vec<Grant>) -> Result<()>;

    /// Replace an object ACL with the given grants
    async fn put_object_acl(&self, bucket: &str, key: &str, grants: Vec<Grant>) -> Result<()>;
}
