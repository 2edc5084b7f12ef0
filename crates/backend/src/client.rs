//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from iris-core.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    AccessControlPolicy, CompletedMultipartUpload, CompletedPart, Grantee, Owner, Type,
};
use aws_smithy_http_client::proxy::ProxyConfig;
use aws_smithy_http_client::{Builder as HttpClientBuilder, tls};
use aws_smithy_types::byte_stream::Length;
use aws_smithy_types::timeout::TimeoutConfig;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use iris_core::{
    AccessControlList, CHECKSUM_METADATA_KEY, ConnectionSettings, Error, Grant, ListOptions,
    ObjectInfo, ObjectPage, ObjectStore, ObjectStoreCredentials, Permission, Result,
    TransferSettings,
};

use crate::multipart::{MultipartConfig, calculate_parts, part_byte_range};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    multipart: MultipartConfig,
}

impl S3Client {
    /// Create a new S3 client from validated credentials
    pub async fn connect(
        credentials: &ObjectStoreCredentials,
        connection: &ConnectionSettings,
        transfer: &TransferSettings,
    ) -> Result<Self> {
        let endpoint = credentials.endpoint_url()?;

        let static_credentials = aws_credential_types::Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None, // session token
            None, // expiry
            "iris-static-credentials",
        );

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(connection.connect_timeout())
            .build();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(static_credentials)
            .region(aws_config::Region::new(connection.region.clone()))
            .endpoint_url(endpoint.as_str())
            .timeout_config(timeouts);

        if let Some(proxy) = connection.proxy_url()? {
            debug!(proxy_host = ?proxy.host_str(), "routing object store requests through proxy");
            let proxy_config = ProxyConfig::all(proxy.as_str())
                .map_err(|e| Error::Config(format!("Invalid connection.proxy: {e}")))?;
            let http_client = HttpClientBuilder::new()
                .proxy_config(proxy_config)
                .tls_provider(tls::Provider::Rustls(tls::rustls_provider::CryptoMode::AwsLc))
                .build_https();
            loader = loader.http_client(http_client);
        }

        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(connection.force_path_style)
            .build();

        debug!(endpoint = %endpoint, region = %connection.region, "created S3 client");

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            multipart: MultipartConfig::from_settings(transfer),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        content_type: String,
        metadata: HashMap<String, String>,
    ) -> Result<Option<String>> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| Error::transfer(key, e))?;

        let response = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .body(body)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;

        Ok(response.e_tag().map(trim_etag))
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        file_size: u64,
        content_type: String,
        metadata: HashMap<String, String>,
    ) -> Result<Option<String>> {
        let created = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::transfer(key, "server returned no upload id"))?
            .to_string();

        // Aborts in the background if the item timeout drops this future
        let pending = PendingUpload {
            client: self.inner.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            finished: false,
        };

        let uploaded = self
            .upload_parts(bucket, key, source, file_size, &pending.upload_id)
            .await;
        match uploaded {
            Ok(etag) => {
                pending.finish();
                Ok(etag)
            }
            Err(e) => {
                pending.abort().await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        file_size: u64,
        upload_id: &str,
    ) -> Result<Option<String>> {
        let part_size = self.multipart.calculate_part_size(file_size);
        let total_parts = calculate_parts(file_size, part_size);
        let mut completed = Vec::with_capacity(total_parts);

        for part_number in 1..=total_parts as i32 {
            let (start, end) = part_byte_range(part_number, part_size, file_size);
            let body = ByteStream::read_from()
                .path(source)
                .offset(start)
                .length(Length::Exact(end - start))
                .build()
                .await
                .map_err(|e| Error::transfer(key, e))?;

            let part = self
                .inner
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(|e| classify(e, bucket, Some(key)))?;

            debug!(key = %key, part_number, total_parts, "uploaded part");
            completed.push(
                CompletedPart::builder()
                    .set_e_tag(part.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        let response = self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;

        Ok(response.e_tag().map(trim_etag))
    }
}

/// A multipart upload that is aborted unless it completes
struct PendingUpload {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    upload_id: String,
    finished: bool,
}

impl PendingUpload {
    fn finish(mut self) {
        self.finished = true;
    }

    async fn abort(mut self) {
        self.finished = true;
        abort_upload(&self.client, &self.bucket, &self.key, &self.upload_id).await;
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, upload_id = %self.upload_id, "multipart upload left incomplete");
            return;
        };
        debug!(key = %self.key, upload_id = %self.upload_id, "aborting cancelled multipart upload");
        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        runtime.spawn(async move { abort_upload(&client, &bucket, &key, &upload_id).await });
    }
}

async fn abort_upload(client: &aws_sdk_s3::Client, bucket: &str, key: &str, upload_id: &str) {
    if let Err(e) = client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        warn!(key = %key, error = %DisplayErrorContext(&e), "failed to abort multipart upload");
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify(e, "", None))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        self.inner
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(e, bucket, None))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ObjectPage> {
        let mut request = self.inner.list_objects_v2().bucket(bucket);

        if let Some(prefix) = options.prefix {
            request = request.prefix(prefix);
        }
        if let Some(max) = options.max_keys {
            request = request.max_keys(max);
        }
        if let Some(token) = options.continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, bucket, None))?;

        let objects = response
            .contents()
            .iter()
            .map(|object| {
                let mut info = ObjectInfo::new(object.key().unwrap_or_default(), object.size().unwrap_or(0));
                info.last_modified = object
                    .last_modified()
                    .and_then(|t| jiff::Timestamp::from_second(t.secs()).ok());
                info.etag = object.e_tag().map(trim_etag);
                info.storage_class = object.storage_class().map(|sc| sc.as_str().to_string());
                info
            })
            .collect();

        let next_continuation_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_continuation_token,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;

        let mut info = ObjectInfo::new(key, response.content_length().unwrap_or(0));
        info.last_modified = response
            .last_modified()
            .and_then(|t| jiff::Timestamp::from_second(t.secs()).ok());
        info.etag = response.e_tag().map(trim_etag);
        info.content_type = response.content_type().map(str::to_string);
        info.storage_class = response.storage_class().map(|sc| sc.as_str().to_string());
        info.checksum = recorded_checksum(response.metadata());
        Ok(info)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: HashMap<String, String>,
    ) -> Result<ObjectInfo> {
        let file_size = tokio::fs::metadata(source)
            .await
            .map_err(|_| Error::LocalFileNotFound(source.to_path_buf()))?
            .len();
        let content_type = mime_guess::from_path(source)
            .first_or_octet_stream()
            .to_string();
        let checksum = metadata.get(CHECKSUM_METADATA_KEY).cloned();

        let etag = if self.multipart.use_multipart(file_size) {
            debug!(key = %key, file_size, "using multipart upload");
            self.put_multipart(bucket, key, source, file_size, content_type.clone(), metadata)
                .await?
        } else {
            self.put_single(bucket, key, source, content_type.clone(), metadata)
                .await?
        };

        let mut info = ObjectInfo::new(key, file_size as i64);
        info.etag = etag;
        info.content_type = Some(content_type);
        info.checksum = checksum;
        info.last_modified = Some(jiff::Timestamp::now());
        Ok(info)
    }

    async fn get_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<ObjectInfo> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;

        let mut info = ObjectInfo::new(key, response.content_length().unwrap_or(0));
        info.last_modified = response
            .last_modified()
            .and_then(|t| jiff::Timestamp::from_second(t.secs()).ok());
        info.etag = response.e_tag().map(trim_etag);
        info.content_type = response.content_type().map(str::to_string);
        info.checksum = recorded_checksum(response.metadata());

        let mut file = tokio::fs::File::create(destination).await?;
        let mut body = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| Error::transfer(key, e))? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(info)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;
        Ok(())
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList> {
        let response = self
            .inner
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(e, bucket, None))?;
        Ok(to_acl(response.owner(), response.grants()))
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList> {
        let response = self
            .inner
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;
        Ok(to_acl(response.owner(), response.grants()))
    }

    async fn put_bucket_acl(&self, bucket: &str, grants: Vec<Grant>) -> Result<()> {
        self.inner
            .put_bucket_acl()
            .bucket(bucket)
            .access_control_policy(access_policy(grants)?)
            .send()
            .await
            .map_err(|e| classify(e, bucket, None))?;
        Ok(())
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, grants: Vec<Grant>) -> Result<()> {
        self.inner
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .access_control_policy(access_policy(grants)?)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;
        Ok(())
    }
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn recorded_checksum(metadata: Option<&HashMap<String, String>>) -> Option<String> {
    metadata.and_then(|m| m.get(CHECKSUM_METADATA_KEY)).cloned()
}

/// Map an SDK failure onto the iris error taxonomy
///
/// `key` is given for object-level requests; a 404 then means the object
/// is missing rather than the bucket.
fn classify<E>(err: SdkError<E>, bucket: &str, key: Option<&str>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();

    if matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
    ) {
        return Error::BackendUnavailable(message);
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    let target = match key {
        Some(key) => format!("{bucket}/{key}"),
        None => bucket.to_string(),
    };

    match (err.code(), status, key) {
        (Some("NoSuchBucket"), _, _) => Error::BucketNotFound(bucket.to_string()),
        (Some("NoSuchKey"), _, Some(key)) | (_, Some(404), Some(key)) => {
            Error::RemoteObjectNotFound(key.to_string())
        }
        (_, Some(404), None) => Error::BucketNotFound(bucket.to_string()),
        (Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _, _)
        | (_, Some(401 | 403), _) => Error::AccessDenied(target),
        _ => Error::BackendUnavailable(message),
    }
}

fn to_acl(owner: Option<&Owner>, grants: &[aws_sdk_s3::types::Grant]) -> AccessControlList {
    let grants = grants
        .iter()
        .filter_map(|grant| {
            let grantee = grant.grantee()?;
            let level = grant.permission()?.as_str();
            let Ok(permission) = level.parse::<Permission>() else {
                debug!(permission = %level, "skipping unknown permission");
                return None;
            };
            let grantee_id = grantee
                .id()
                .or(grantee.uri())
                .or(grantee.email_address())
                .unwrap_or_default()
                .to_string();
            Some(Grant {
                grantee_id,
                grantee_display_name: grantee.display_name().map(str::to_string),
                permission,
            })
        })
        .collect();

    AccessControlList {
        owner_id: owner.and_then(|o| o.id()).map(str::to_string),
        grants,
    }
}

fn access_policy(grants: Vec<Grant>) -> Result<AccessControlPolicy> {
    let grants = grants
        .into_iter()
        .map(|grant| {
            let grantee = Grantee::builder()
                .r#type(Type::CanonicalUser)
                .id(grant.grantee_id)
                .set_display_name(grant.grantee_display_name)
                .build()
                .map_err(|e| Error::Config(e.to_string()))?;
            Ok(aws_sdk_s3::types::Grant::builder()
                .grantee(grantee)
                .permission(aws_sdk_s3::types::Permission::from(grant.permission.as_str()))
                .build())
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AccessControlPolicy::builder().set_grants(Some(grants)).build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::http::HttpResponse;
    use aws_sdk_s3::operation::head_object::HeadObjectError;
    use aws_sdk_s3::types::error::NotFound;
    use aws_smithy_http_client::test_util::capture_request;
    use aws_smithy_types::body::SdkBody;

    fn response(status: u16) -> HttpResponse {
        HttpResponse::new(status.try_into().unwrap(), SdkBody::empty())
    }

    fn not_found(status: u16) -> SdkError<HeadObjectError> {
        SdkError::service_error(
            HeadObjectError::NotFound(NotFound::builder().build()),
            response(status),
        )
    }

    #[tokio::test]
    async fn test_dropped_multipart_upload_is_aborted() {
        let (http_client, requests) = capture_request(None);
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(aws_credential_types::Credentials::new(
                "key", "secret", None, None, "test",
            ))
            .endpoint_url("http://tenant.hcp.example.org")
            .force_path_style(true)
            .http_client(http_client)
            .build();

        drop(PendingUpload {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: "runs".into(),
            key: "big.bam".into(),
            upload_id: "upload-1".into(),
            finished: false,
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let request = requests.expect_request();
        assert_eq!(request.method(), "DELETE");
        assert!(request.uri().contains("/runs/big.bam"));
        assert!(request.uri().contains("uploadId=upload-1"));
    }

    #[test]
    fn test_classify_missing_object() {
        let err = classify(not_found(404), "runs", Some("a.txt"));
        assert!(matches!(err, Error::RemoteObjectNotFound(key) if key == "a.txt"));
    }

    #[test]
    fn test_classify_missing_bucket() {
        let err = classify(not_found(404), "runs", None);
        assert!(matches!(err, Error::BucketNotFound(name) if name == "runs"));
    }

    #[test]
    fn test_classify_forbidden() {
        let err = classify(not_found(403), "runs", None);
        assert!(matches!(err, Error::AccessDenied(_)));
    }

    #[test]
    fn test_classify_timeout() {
        let err: SdkError<HeadObjectError> = SdkError::timeout_error("deadline elapsed");
        assert!(matches!(
            classify(err, "runs", None),
            Error::BackendUnavailable(_)
        ));
    }

    #[test]
    fn test_acl_round_trip_through_sdk_types() {
        let policy = access_policy(vec![
            Grant::new("user-1", Permission::Read),
            Grant::new("user-2", Permission::FullControl),
        ])
        .unwrap();

        let acl = to_acl(None, policy.grants());
        assert_eq!(acl.grants.len(), 2);
        assert_eq!(acl.grants[0].grantee_id, "user-1");
        assert_eq!(acl.grants[1].permission, Permission::FullControl);
        assert!(acl.owner_id.is_none());
    }
}
