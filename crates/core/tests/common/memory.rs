//! In-memory object store for handler tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use iris_core::{
    AccessControlList, Error, Grant, ListOptions, ObjectInfo, ObjectPage, ObjectStore, Result,
};

#[derive(Default)]
struct StoredObject {
    data: Vec<u8>,
    metadata: HashMap<String, String>,
    acl: AccessControlList,
}

#[derive(Default)]
struct Bucket {
    objects: BTreeMap<String, StoredObject>,
    acl: AccessControlList,
}

/// How a download breaks off after writing the first half of the data
#[derive(Clone, Copy)]
pub enum Truncation {
    Stall(Duration),
    Fail,
}

#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<BTreeMap<String, Bucket>>,
    denied: HashSet<String>,
    put_delay: Option<Duration>,
    read_only: bool,
    truncate_downloads: Option<Truncation>,
    acl_writes: AtomicUsize,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn with_bucket(name: &str) -> Self {
        let store = Self::default();
        store.create_bucket(name);
        store
    }

    pub fn create_bucket(&self, name: &str) {
        self.buckets
            .lock()
            .unwrap()
            .insert(name.to_string(), Bucket::default());
    }

    /// Buckets that exist but refuse every request
    pub fn deny(mut self, name: &str) -> Self {
        self.create_bucket(name);
        self.denied.insert(name.to_string());
        self
    }

    /// Make every upload take this long
    pub fn slow_uploads(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    /// Refuse every upload with `AccessDenied`
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Write half of each object, then stall or fail
    pub fn truncate_downloads(mut self, truncation: Truncation) -> Self {
        self.truncate_downloads = Some(truncation);
        self
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8], metadata: &[(&str, &str)]) {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.get_mut(bucket).expect("bucket exists");
        bucket.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                acl: AccessControlList::default(),
            },
        );
    }

    pub fn data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let buckets = self.buckets.lock().unwrap();
        buckets.get(bucket)?.objects.get(key).map(|o| o.data.clone())
    }

    pub fn metadata(&self, bucket: &str, key: &str) -> Option<HashMap<String, String>> {
        let buckets = self.buckets.lock().unwrap();
        buckets
            .get(bucket)?
            .objects
            .get(key)
            .map(|o| o.metadata.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let buckets = self.buckets.lock().unwrap();
        buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn acl_writes(&self) -> usize {
        self.acl_writes.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check(&self, bucket: &str) -> Result<()> {
        if self.denied.contains(bucket) {
            return Err(Error::AccessDenied(bucket.to_string()));
        }
        if !self.buckets.lock().unwrap().contains_key(bucket) {
            return Err(Error::BucketNotFound(bucket.to_string()));
        }
        Ok(())
    }

    fn info(key: &str, object: &StoredObject) -> ObjectInfo {
        let mut info = ObjectInfo::new(key, object.data.len() as i64);
        info.checksum = object.metadata.get(iris_core::CHECKSUM_METADATA_KEY).cloned();
        info
    }

    fn with_object<T>(
        &self,
        bucket: &str,
        key: &str,
        f: impl FnOnce(&mut StoredObject) -> T,
    ) -> Result<T> {
        self.check(bucket)?;
        let mut buckets = self.buckets.lock().unwrap();
        let object = buckets
            .get_mut(bucket)
            .and_then(|b| b.objects.get_mut(key))
            .ok_or_else(|| Error::RemoteObjectNotFound(key.to_string()))?;
        Ok(f(object))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.lock().unwrap().keys().cloned().collect())
    }

    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        self.check(bucket)
    }

    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ObjectPage> {
        self.check(bucket)?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let buckets = self.buckets.lock().unwrap();
        let max_keys = options.max_keys.unwrap_or(1000).max(1) as usize;
        let prefix = options.prefix.unwrap_or_default();

        let mut matching = buckets[bucket]
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| match &options.continuation_token {
                Some(after) => key.as_str() > after.as_str(),
                None => true,
            });

        let objects: Vec<ObjectInfo> = matching
            .by_ref()
            .take(max_keys)
            .map(|(key, object)| Self::info(key, object))
            .collect();
        let next_continuation_token = match matching.next() {
            Some(_) => objects.last().map(|o| o.key.clone()),
            None => None,
        };

        Ok(ObjectPage {
            objects,
            next_continuation_token,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        self.with_object(bucket, key, |object| Self::info(key, object))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: HashMap<String, String>,
    ) -> Result<ObjectInfo> {
        self.check(bucket)?;
        if self.read_only {
            return Err(Error::AccessDenied(format!("{bucket}/{key}")));
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        let data = tokio::fs::read(source).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let object = StoredObject {
            data: data?,
            metadata,
            acl: AccessControlList::default(),
        };
        let info = Self::info(key, &object);
        self.buckets
            .lock()
            .unwrap()
            .get_mut(bucket)
            .expect("bucket checked")
            .objects
            .insert(key.to_string(), object);
        Ok(info)
    }

    async fn get_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<ObjectInfo> {
        let (data, info) =
            self.with_object(bucket, key, |object| (object.data.clone(), Self::info(key, object)))?;
        match self.truncate_downloads {
            None => {
                tokio::fs::write(destination, data).await?;
                Ok(info)
            }
            Some(truncation) => {
                tokio::fs::write(destination, &data[..data.len() / 2]).await?;
                match truncation {
                    Truncation::Stall(delay) => {
                        tokio::time::sleep(delay).await;
                        Ok(info)
                    }
                    Truncation::Fail => Err(Error::BackendUnavailable("connection reset".into())),
                }
            }
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.check(bucket)?;
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .get_mut(bucket)
            .and_then(|b| b.objects.remove(key))
            .map(|_| ())
            .ok_or_else(|| Error::RemoteObjectNotFound(key.to_string()))
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList> {
        self.check(bucket)?;
        Ok(self.buckets.lock().unwrap()[bucket].acl.clone())
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList> {
        self.with_object(bucket, key, |object| object.acl.clone())
    }

    async fn put_bucket_acl(&self, bucket: &str, grants: Vec<Grant>) -> Result<()> {
        self.acl_writes.fetch_add(1, Ordering::SeqCst);
        self.check(bucket)?;
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(b) = buckets.get_mut(bucket) {
            b.acl.grants = grants;
        }
        Ok(())
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, grants: Vec<Grant>) -> Result<()> {
        self.acl_writes.fetch_add(1, Ordering::SeqCst);
        self.with_object(bucket, key, |object| object.acl.grants = grants)
    }
}
