//! Object store handler
//!
//! [`ObjectStoreHandler`] owns the object store client and the mounted
//! bucket. Every operation borrows the handler shared; mounting borrows it
//! exclusively, so a bucket cannot be remounted while transfers against the
//! previous one are still running.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::acl::{AccessControlList, parse_grants};
use crate::config::TransferSettings;
use crate::encoding::{CHECKSUM_METADATA_KEY, file_checksum};
use crate::error::{Error, Result};
use crate::traits::{ListOptions, ObjectInfo, ObjectStore};
use crate::transfer::{
    DeleteReport, TransferItem, TransferOutcome, TransferReceipt, TransferReport,
    local_path_for_key,
};

/// One entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectEntry {
    pub key: String,

    /// Full metadata, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ObjectInfo>,
}

/// Handler for the object store backend
pub struct ObjectStoreHandler {
    store: Arc<dyn ObjectStore>,
    settings: TransferSettings,
    mounted: Option<String>,
}

impl ObjectStoreHandler {
    /// Create a handler around an authenticated client
    pub fn new(store: Arc<dyn ObjectStore>, settings: TransferSettings) -> Self {
        Self {
            store,
            settings,
            mounted: None,
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Name of the mounted bucket, if any
    pub fn mounted_bucket(&self) -> Option<&str> {
        self.mounted.as_deref()
    }

    fn bucket(&self) -> Result<&str> {
        self.mounted.as_deref().ok_or(Error::NoBucketMounted)
    }

    /// List the buckets visible to the credentials
    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        self.store.list_buckets().await.map_err(|e| match e {
            Error::AccessDenied(msg) | Error::Authentication(msg) => {
                Error::BackendUnavailable(msg)
            }
            other => other,
        })
    }

    /// Check that a bucket is reachable; defaults to the mounted one
    pub async fn test_connection(&self, bucket: Option<&str>) -> Result<()> {
        let bucket = match bucket {
            Some(name) => name,
            None => self.bucket()?,
        };
        self.store.head_bucket(bucket).await
    }

    /// Bind the handler to a bucket, replacing any previous mount
    pub async fn mount_bucket(&mut self, name: &str) -> Result<()> {
        self.store.head_bucket(name).await?;
        if let Some(previous) = self.mounted.replace(name.to_string()) {
            info!(previous = %previous, bucket = %name, "remounted bucket");
        } else {
            info!(bucket = %name, "mounted bucket");
        }
        Ok(())
    }

    pub fn unmount_bucket(&mut self) {
        self.mounted = None;
    }

    /// Lazily paginated listing of the mounted bucket
    ///
    /// Pages are requested only as the stream is polled.
    pub fn list_objects(
        &self,
        include_metadata: bool,
    ) -> Result<impl Stream<Item = Result<ObjectEntry>> + Send + 'static> {
        let objects = self.object_stream(None)?;
        Ok(objects.map_ok(move |info| ObjectEntry {
            key: info.key.clone(),
            info: include_metadata.then_some(info),
        }))
    }

    fn object_stream(
        &self,
        prefix: Option<String>,
    ) -> Result<impl Stream<Item = Result<ObjectInfo>> + Send + 'static> {
        enum Cursor {
            Start,
            Next(String),
            Done,
        }

        let bucket = self.bucket()?.to_string();
        let store = Arc::clone(&self.store);
        let page_size = self.settings.list_page_size;

        let pages = stream::try_unfold(Cursor::Start, move |cursor| {
            let store = Arc::clone(&store);
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            async move {
                let continuation_token = match cursor {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => None,
                    Cursor::Next(token) => Some(token),
                };
                let options = ListOptions {
                    max_keys: Some(page_size),
                    prefix,
                    continuation_token,
                };
                let page = store.list_objects(&bucket, options).await?;
                debug!(bucket = %bucket, objects = page.objects.len(), "fetched listing page");

                let next = match page.next_continuation_token {
                    Some(token) => Cursor::Next(token),
                    None => Cursor::Done,
                };
                let objects = stream::iter(page.objects.into_iter().map(Ok::<_, Error>));
                Ok::<_, Error>(Some((objects, next)))
            }
        });

        Ok(pages.try_flatten())
    }

    /// Whether an object exists in the mounted bucket
    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        match self.store.head_object(self.bucket()?, key).await {
            Ok(_) => Ok(true),
            Err(Error::RemoteObjectNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Metadata of one object in the mounted bucket
    pub async fn object_info(&self, key: &str) -> Result<ObjectInfo> {
        self.store.head_object(self.bucket()?, key).await
    }

    /// Keys containing `needle`; case-insensitive unless asked otherwise
    pub async fn search_objects(&self, needle: &str, case_sensitive: bool) -> Result<Vec<String>> {
        let needle = if case_sensitive {
            needle.to_string()
        } else {
            needle.to_lowercase()
        };

        self.object_stream(None)?
            .try_filter_map(|info| {
                let haystack = if case_sensitive {
                    info.key.clone()
                } else {
                    info.key.to_lowercase()
                };
                let hit = haystack.contains(&needle).then_some(info.key);
                async move { Ok(hit) }
            })
            .try_collect()
            .await
    }

    async fn with_timeout<F>(&self, key: &str, transfer: F) -> Result<TransferReceipt>
    where
        F: Future<Output = Result<TransferReceipt>>,
    {
        let limit = self.settings.item_timeout();
        match tokio::time::timeout(limit, transfer).await {
            Ok(result) => result,
            Err(_) => Err(Error::transfer(
                key,
                format!("timed out after {}s", limit.as_secs()),
            )),
        }
    }

    /// Upload one file to the mounted bucket
    ///
    /// The key defaults to the file's base name. The file's SHA-256 is
    /// stored with the object for verification on download.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        remote_key: Option<&str>,
    ) -> Result<TransferReceipt> {
        let bucket = self.bucket()?;
        if !local_path.is_file() {
            return Err(Error::LocalFileNotFound(local_path.to_path_buf()));
        }

        let key = match remote_key {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| Error::LocalFileNotFound(local_path.to_path_buf()))?,
        };

        self.with_timeout(&key, self.put(bucket, &key, local_path))
            .await
    }

    async fn put(&self, bucket: &str, key: &str, local_path: &Path) -> Result<TransferReceipt> {
        let local_error = |e: Error| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::LocalFileNotFound(local_path.to_path_buf())
            }
            other => Error::transfer(key, other),
        };

        let size_bytes = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| local_error(e.into()))?
            .len();
        let checksum = file_checksum(local_path).await.map_err(local_error)?;

        let metadata = HashMap::from([(CHECKSUM_METADATA_KEY.to_string(), checksum.clone())]);
        self.store
            .put_object(bucket, key, local_path, metadata)
            .await
            .map_err(|e| match e {
                Error::Transfer { .. } | Error::LocalFileNotFound(_) => e,
                other => Error::transfer(key, other),
            })?;

        debug!(bucket = %bucket, key = %key, size_bytes, "uploaded");
        Ok(TransferReceipt {
            key: key.to_string(),
            local_path: local_path.to_path_buf(),
            size_bytes,
            checksum: Some(checksum),
        })
    }

    /// Upload every file under a folder, keeping its relative layout
    pub async fn upload_folder(
        &self,
        local_folder: &Path,
        prefix: Option<&str>,
    ) -> Result<TransferReport> {
        self.bucket()?;
        let items = TransferItem::collect_folder(local_folder, prefix)?;
        info!(folder = %local_folder.display(), files = items.len(), "uploading folder");
        self.upload_batch(items).await
    }

    /// Upload a batch of items, each independently
    ///
    /// Runs up to `settings.concurrency` uploads at once. The report holds
    /// one outcome per item.
    pub async fn upload_batch(&self, items: Vec<TransferItem>) -> Result<TransferReport> {
        self.bucket()?;

        let report: TransferReport = stream::iter(items)
            .map(|item| async move {
                let result = self.upload_file(&item.local_path, Some(&item.key)).await;
                if let Err(e) = &result {
                    warn!(key = %item.key, error = %e, "upload failed");
                }
                TransferOutcome::from_result(item, result)
            })
            .buffer_unordered(self.settings.workers())
            .collect()
            .await;

        info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            "batch upload finished"
        );
        Ok(report)
    }

    /// Download one object into `local_path`, creating parent folders
    ///
    /// Data is staged in a sibling temporary file and renamed into place
    /// only once the transfer and checksum check have succeeded.
    pub async fn download_file(&self, key: &str, local_path: &Path) -> Result<TransferReceipt> {
        let bucket = self.bucket()?;
        self.with_timeout(key, self.fetch(bucket, key, local_path))
            .await
    }

    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<TransferReceipt> {
        let parent = match local_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::transfer(key, e))?;

        // Removed on drop, so a failed or timed-out transfer leaves nothing behind
        let staging = tempfile::Builder::new()
            .prefix(".iris-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| Error::transfer(key, e))?
            .into_temp_path();

        let info = self
            .store
            .get_object(bucket, key, &staging)
            .await
            .map_err(|e| match e {
                Error::RemoteObjectNotFound(_) | Error::Transfer { .. } => e,
                other => Error::transfer(key, other),
            })?;

        let checksum = match (&info.checksum, self.settings.verify_checksums) {
            (Some(expected), true) => {
                let actual = file_checksum(&staging)
                    .await
                    .map_err(|e| Error::transfer(key, e))?;
                if &actual != expected {
                    warn!(key = %key, expected = %expected, actual = %actual, "checksum mismatch");
                    if let Err(e) = staging.close() {
                        warn!(key = %key, error = %e, "failed to remove partial download");
                    }
                    return Err(Error::transfer(
                        key,
                        format!("checksum mismatch: expected {expected}, got {actual}"),
                    ));
                }
                Some(actual)
            }
            (recorded, _) => recorded.clone(),
        };

        let size_bytes = tokio::fs::metadata(&staging)
            .await
            .map_err(|e| Error::transfer(key, e))?
            .len();
        staging
            .persist(local_path)
            .map_err(|e| Error::transfer(key, e.error))?;

        debug!(bucket = %bucket, key = %key, size_bytes, "downloaded");
        Ok(TransferReceipt {
            key: key.to_string(),
            local_path: local_path.to_path_buf(),
            size_bytes,
            checksum,
        })
    }

    /// Download every object of the mounted bucket under `local_folder`
    ///
    /// Keys map to paths relative to the folder. Keys ending in `/` become
    /// directories.
    pub async fn download_all_objects(&self, local_folder: &Path) -> Result<TransferReport> {
        self.bucket()?;
        tokio::fs::create_dir_all(local_folder).await?;

        let keys: Vec<String> = self
            .object_stream(None)?
            .map_ok(|info| info.key)
            .try_collect()
            .await?;
        info!(folder = %local_folder.display(), objects = keys.len(), "downloading bucket");

        let report: TransferReport = stream::iter(keys)
            .map(|key| async move {
                let target = match local_path_for_key(local_folder, &key) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(key = %key, error = %e, "skipping key");
                        return TransferOutcome::from_result(
                            TransferItem::new(local_folder, key),
                            Err(e),
                        );
                    }
                };

                let result = if key.ends_with('/') {
                    tokio::fs::create_dir_all(&target)
                        .await
                        .map(|()| TransferReceipt {
                            key: key.clone(),
                            local_path: target.clone(),
                            size_bytes: 0,
                            checksum: None,
                        })
                        .map_err(|e| Error::transfer(&key, e))
                } else {
                    self.download_file(&key, &target).await
                };

                if let Err(e) = &result {
                    warn!(key = %key, error = %e, "download failed");
                }
                TransferOutcome::from_result(TransferItem::new(target, key), result)
            })
            .buffer_unordered(self.settings.workers())
            .collect()
            .await;

        info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            "bucket download finished"
        );
        Ok(report)
    }

    /// Delete one object; fails if it does not exist
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        let bucket = self.bucket()?;
        self.store.head_object(bucket, key).await?;
        self.store.delete_object(bucket, key).await?;
        info!(bucket = %bucket, key = %key, "deleted object");
        Ok(())
    }

    /// Delete several objects, recording a result per key
    pub async fn delete_objects<K: AsRef<str>>(&self, keys: &[K]) -> Result<DeleteReport> {
        self.bucket()?;
        let mut report = DeleteReport::default();
        for key in keys {
            let key = key.as_ref();
            match self.delete_object(key).await {
                Ok(()) => report.deleted.push(key.to_string()),
                Err(e) => {
                    warn!(key = %key, error = %e, "delete failed");
                    report.failed.push((key.to_string(), e));
                }
            }
        }
        Ok(report)
    }

    /// Delete a folder and the objects directly inside it
    ///
    /// Folders that contain sub-folders are refused.
    pub async fn delete_folder(&self, folder: &str) -> Result<DeleteReport> {
        self.bucket()?;
        let folder = format!("{}/", folder.trim_end_matches('/'));

        let keys: Vec<String> = self
            .object_stream(Some(folder.clone()))?
            .map_ok(|info| info.key)
            .try_collect()
            .await?;

        if keys.is_empty() {
            return Err(Error::RemoteObjectNotFound(folder));
        }
        if keys
            .iter()
            .filter_map(|k| k.strip_prefix(&folder))
            .any(|rest| rest.contains('/'))
        {
            return Err(Error::Conflict(format!(
                "'{folder}' contains sub-folders; remove them first"
            )));
        }

        // children first, marker last
        let mut ordered: Vec<&String> = keys.iter().filter(|k| **k != folder).collect();
        ordered.extend(keys.iter().filter(|k| **k == folder));
        self.delete_objects(&ordered).await
    }

    pub async fn get_bucket_acl(&self) -> Result<AccessControlList> {
        self.store.get_bucket_acl(self.bucket()?).await
    }

    pub async fn get_object_acl(&self, key: &str) -> Result<AccessControlList> {
        self.store.get_object_acl(self.bucket()?, key).await
    }

    /// Grant `permission` on the mounted bucket to `principal`
    pub async fn set_bucket_acl(&self, principal: &str, permission: &str) -> Result<()> {
        self.modify_bucket_acl(&[(principal, permission)]).await
    }

    /// Grant `permission` on one object to `principal`
    pub async fn set_object_acl(&self, key: &str, principal: &str, permission: &str) -> Result<()> {
        self.modify_object_acl(key, &[(principal, permission)]).await
    }

    /// Replace the bucket ACL with `(principal, permission)` entries
    pub async fn modify_bucket_acl<P, L>(&self, entries: &[(P, L)]) -> Result<()>
    where
        P: AsRef<str>,
        L: AsRef<str>,
    {
        let bucket = self.bucket()?;
        let grants = parse_grants(entries)?;
        self.store.put_bucket_acl(bucket, grants).await?;
        info!(bucket = %bucket, entries = entries.len(), "updated bucket ACL");
        Ok(())
    }

    /// Replace an object ACL with `(principal, permission)` entries
    pub async fn modify_object_acl<P, L>(&self, key: &str, entries: &[(P, L)]) -> Result<()>
    where
        P: AsRef<str>,
        L: AsRef<str>,
    {
        let bucket = self.bucket()?;
        let grants = parse_grants(entries)?;
        self.store.put_object_acl(bucket, key, grants).await?;
        info!(bucket = %bucket, key = %key, entries = entries.len(), "updated object ACL");
        Ok(())
    }
}
