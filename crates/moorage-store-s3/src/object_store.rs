// crates/moorage-store-s3/src/object_store.rs
// ============================================================================
// Module: S3 Object Store
// Description: Versioned S3 buckets behind the synchronous object-store seam.
// Purpose: Bucket lifecycle, versioned transfers, multipart uploads, SSE-C.
// ============================================================================

//! ## Overview
//! Wraps the AWS S3 SDK behind [`ObjectStore`]. Every call blocks on an
//! owned multi-thread Tokio runtime. Service error codes are folded into
//! the seam's error taxonomy so the core crate's transient classification
//! applies unchanged to real S3 responses.

use std::io::Write;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::BucketLocationConstraint;
use aws_sdk_s3::types::BucketVersioningStatus;
use aws_sdk_s3::types::CompletedMultipartUpload;
use aws_sdk_s3::types::CompletedPart;
use aws_sdk_s3::types::CreateBucketConfiguration;
use aws_sdk_s3::types::VersioningConfiguration;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::Digest;
use md5::Md5;
use moorage_core::ObjectStore;
use moorage_core::SseKey;
use moorage_core::VersioningState;
use moorage_core::backend::MultipartUpload;
use moorage_core::backend::ObjectStoreError;
use serde::Deserialize;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::debug;

/// Region S3 treats as the default location with no constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// SSE-C algorithm name forwarded on encrypted object operations.
const SSE_ALGORITHM: &str = "AES256";

/// Configuration for the S3-backed object store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct S3ObjectStoreConfig {
    /// AWS region; falls back to environment configuration when unset.
    pub region: Option<String>,
    /// Custom endpoint URL for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Force path-style addressing for S3-compatible stores.
    pub force_path_style: bool,
}

/// SSE-C request headers derived from a customer key.
struct SseHeaders {
    /// Base64-encoded key material.
    key: String,
    /// Base64-encoded MD5 digest of the key material.
    digest: String,
}

/// Derives the SSE-C header values for a customer key.
fn sse_headers(sse: &SseKey) -> SseHeaders {
    let raw = sse.as_bytes();
    SseHeaders { key: BASE64.encode(raw), digest: BASE64.encode(Md5::digest(raw)) }
}

/// Normalizes a bucket location constraint into a region name.
fn region_of(constraint: Option<&BucketLocationConstraint>) -> String {
    match constraint {
        // S3 reports the default region as an empty constraint.
        None => DEFAULT_REGION.to_string(),
        Some(value) if value.as_str().is_empty() => DEFAULT_REGION.to_string(),
        Some(value) => value.as_str().to_string(),
    }
}

/// Folds an SDK error into the seam's error taxonomy.
fn classify<E>(error: &SdkError<E>, bucket: &str, key: Option<&str>) -> ObjectStoreError
where
    E: ProvideErrorMetadata,
{
    if matches!(error, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return ObjectStoreError::Unavailable(format!(
            "request to bucket '{bucket}' could not be dispatched"
        ));
    }
    let code = error.code().unwrap_or("Unknown");
    let message = error.message().unwrap_or("no message").to_string();
    match code {
        "NoSuchBucket" => ObjectStoreError::NoSuchBucket(bucket.to_string()),
        "BucketAlreadyOwnedByYou" => ObjectStoreError::BucketAlreadyOwnedByYou(bucket.to_string()),
        "OperationAborted" => ObjectStoreError::OperationAborted(bucket.to_string()),
        "NoSuchKey" | "NoSuchVersion" | "NotFound" => key.map_or_else(
            || ObjectStoreError::Service(format!("{code}: {message}")),
            |key| ObjectStoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
        ),
        "SlowDown" | "ServiceUnavailable" | "InternalError" | "RequestTimeout" => {
            ObjectStoreError::Unavailable(format!("{code}: {message}"))
        }
        _ => ObjectStoreError::Service(format!("{code}: {message}")),
    }
}

/// Builds the error for a write that came back without a version id.
fn missing_version(bucket: &str, key: &str) -> ObjectStoreError {
    ObjectStoreError::Service(format!(
        "bucket '{bucket}' returned no version id for key '{key}'; versioning is not active"
    ))
}

/// S3-backed object store.
pub struct S3ObjectStore {
    /// S3 client handle.
    client: Client,
    /// Tokio runtime for blocking SDK calls.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for S3ObjectStore {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl S3ObjectStore {
    /// Creates a new S3 object store.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the runtime or client cannot be
    /// built.
    pub fn new(config: &S3ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        let shared_config = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &config.region {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(endpoint) = &config.endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            loader.load().await
        });
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        Ok(Self { client, runtime: Some(Arc::new(runtime)) })
    }

    /// Returns the owned runtime.
    fn runtime(&self) -> Result<&Arc<Runtime>, ObjectStoreError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| ObjectStoreError::Service("object store is closed".to_string()))
    }

    /// Deletes every object version and delete marker in a bucket.
    async fn purge_versions(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let listing = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(|err| classify(&err, bucket, None))?;
            let mut targets = Vec::new();
            for version in listing.versions() {
                if let (Some(key), Some(id)) = (version.key(), version.version_id()) {
                    targets.push((key.to_string(), id.to_string()));
                }
            }
            for marker in listing.delete_markers() {
                if let (Some(key), Some(id)) = (marker.key(), marker.version_id()) {
                    targets.push((key.to_string(), id.to_string()));
                }
            }
            for (key, id) in targets {
                self.client
                    .delete_object()
                    .bucket(bucket)
                    .key(&key)
                    .version_id(id)
                    .send()
                    .await
                    .map_err(|err| classify(&err, bucket, Some(&key)))?;
            }
            if listing.is_truncated() != Some(true) {
                return Ok(());
            }
            key_marker = listing.next_key_marker().map(ToString::to_string);
            version_marker = listing.next_version_id_marker().map(ToString::to_string);
        }
    }

    /// Aborts every open multipart upload in a bucket.
    async fn purge_uploads(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        let mut key_marker: Option<String> = None;
        let mut upload_marker: Option<String> = None;
        loop {
            let listing = self
                .client
                .list_multipart_uploads()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_marker.take())
                .send()
                .await
                .map_err(|err| classify(&err, bucket, None))?;
            for upload in listing.uploads() {
                if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
                    self.client
                        .abort_multipart_upload()
                        .bucket(bucket)
                        .key(key)
                        .upload_id(id)
                        .send()
                        .await
                        .map_err(|err| classify(&err, bucket, Some(key)))?;
                }
            }
            if listing.is_truncated() != Some(true) {
                return Ok(());
            }
            key_marker = listing.next_key_marker().map(ToString::to_string);
            upload_marker = listing.next_upload_id_marker().map(ToString::to_string);
        }
    }
}

impl ObjectStore for S3ObjectStore {
    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ObjectStoreError> {
        self.runtime()?.block_on(async {
            let mut request = self.client.create_bucket().bucket(bucket);
            // The default region rejects an explicit location constraint.
            if region != DEFAULT_REGION {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region))
                        .build(),
                );
            }
            request.send().await.map_err(|err| classify(&err, bucket, None))?;
            debug!(bucket, region, "created bucket");
            Ok(())
        })
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, ObjectStoreError> {
        self.runtime()?.block_on(async {
            match self.client.head_bucket().bucket(bucket).send().await {
                Ok(_) => Ok(true),
                Err(err) if err.as_service_error().is_some_and(HeadBucketError::is_not_found) => {
                    Ok(false)
                }
                Err(err) => Err(classify(&err, bucket, None)),
            }
        })
    }

    fn bucket_location(&self, bucket: &str) -> Result<String, ObjectStoreError> {
        self.runtime()?.block_on(async {
            let output = self
                .client
                .get_bucket_location()
                .bucket(bucket)
                .send()
                .await
                .map_err(|err| classify(&err, bucket, None))?;
            Ok(region_of(output.location_constraint()))
        })
    }

    fn delete_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        self.runtime()?.block_on(async {
            self.client
                .delete_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|err| classify(&err, bucket, None))?;
            debug!(bucket, "deleted bucket");
            Ok(())
        })
    }

    fn purge_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        self.runtime()?.block_on(async {
            self.purge_versions(bucket).await?;
            self.purge_uploads(bucket).await?;
            debug!(bucket, "purged bucket");
            Ok(())
        })
    }

    fn enable_versioning(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        self.runtime()?.block_on(async {
            self.client
                .put_bucket_versioning()
                .bucket(bucket)
                .versioning_configuration(
                    VersioningConfiguration::builder()
                        .status(BucketVersioningStatus::Enabled)
                        .build(),
                )
                .send()
                .await
                .map_err(|err| classify(&err, bucket, None))?;
            Ok(())
        })
    }

    fn versioning_state(&self, bucket: &str) -> Result<VersioningState, ObjectStoreError> {
        self.runtime()?.block_on(async {
            let output = self
                .client
                .get_bucket_versioning()
                .bucket(bucket)
                .send()
                .await
                .map_err(|err| classify(&err, bucket, None))?;
            Ok(match output.status() {
                Some(BucketVersioningStatus::Enabled) => VersioningState::Enabled,
                Some(BucketVersioningStatus::Suspended) => VersioningState::Suspended,
                _ => VersioningState::Unversioned,
            })
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        sse: Option<&SseKey>,
    ) -> Result<String, ObjectStoreError> {
        self.runtime()?.block_on(async {
            let mut request = self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(body.to_vec()));
            if let Some(sse) = sse {
                let headers = sse_headers(sse);
                request = request
                    .sse_customer_algorithm(SSE_ALGORITHM)
                    .sse_customer_key(headers.key)
                    .sse_customer_key_md5(headers.digest);
            }
            let output =
                request.send().await.map_err(|err| classify(&err, bucket, Some(key)))?;
            output
                .version_id()
                .map(ToString::to_string)
                .ok_or_else(|| missing_version(bucket, key))
        })
    }

    fn start_multipart(
        &self,
        bucket: &str,
        key: &str,
        sse: Option<&SseKey>,
    ) -> Result<Box<dyn MultipartUpload>, ObjectStoreError> {
        let runtime = Arc::clone(self.runtime()?);
        let upload_id = runtime.block_on(async {
            let mut request = self.client.create_multipart_upload().bucket(bucket).key(key);
            if let Some(sse) = sse {
                let headers = sse_headers(sse);
                request = request
                    .sse_customer_algorithm(SSE_ALGORITHM)
                    .sse_customer_key(headers.key)
                    .sse_customer_key_md5(headers.digest);
            }
            let output =
                request.send().await.map_err(|err| classify(&err, bucket, Some(key)))?;
            output.upload_id().map(ToString::to_string).ok_or_else(|| {
                ObjectStoreError::Service(format!(
                    "bucket '{bucket}' returned no upload id for key '{key}'"
                ))
            })
        })?;
        debug!(bucket, key, upload_id, "started multipart upload");
        Ok(Box::new(S3MultipartUpload {
            client: self.client.clone(),
            runtime,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            sse: sse.cloned(),
            parts: Vec::new(),
            next_part: 1,
        }))
    }

    fn read_object(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
        sse: Option<&SseKey>,
        writable: &mut dyn Write,
    ) -> Result<u64, ObjectStoreError> {
        self.runtime()?.block_on(async {
            let mut request =
                self.client.get_object().bucket(bucket).key(key).version_id(version);
            if let Some(sse) = sse {
                let headers = sse_headers(sse);
                request = request
                    .sse_customer_algorithm(SSE_ALGORITHM)
                    .sse_customer_key(headers.key)
                    .sse_customer_key_md5(headers.digest);
            }
            let output =
                request.send().await.map_err(|err| classify(&err, bucket, Some(key)))?;
            let mut body = output.body;
            let mut total = 0u64;
            while let Some(chunk) = body
                .try_next()
                .await
                .map_err(|err| ObjectStoreError::Service(err.to_string()))?
            {
                writable.write_all(&chunk)?;
                total += chunk.len() as u64;
            }
            Ok(total)
        })
    }

    fn object_size(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
    ) -> Result<u64, ObjectStoreError> {
        self.runtime()?.block_on(async {
            let output = self
                .client
                .head_object()
                .bucket(bucket)
                .key(key)
                .version_id(version)
                .send()
                .await
                .map_err(|err| classify(&err, bucket, Some(key)))?;
            let length = output.content_length().unwrap_or(0);
            u64::try_from(length).map_err(|_| {
                ObjectStoreError::Service(format!(
                    "bucket '{bucket}' reported a negative length for key '{key}'"
                ))
            })
        })
    }

    fn delete_version(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
    ) -> Result<(), ObjectStoreError> {
        self.runtime()?.block_on(async {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .version_id(version)
                .send()
                .await
                .map_err(|err| classify(&err, bucket, Some(key)))?;
            Ok(())
        })
    }
}

/// One multipart upload in progress against S3.
struct S3MultipartUpload {
    /// S3 client handle shared with the parent store.
    client: Client,
    /// Runtime shared with the parent store.
    runtime: Arc<Runtime>,
    /// Target bucket.
    bucket: String,
    /// Target object key.
    key: String,
    /// Upload id issued at initiation.
    upload_id: String,
    /// Customer key forwarded on each part.
    sse: Option<SseKey>,
    /// Completed parts in submission order.
    parts: Vec<CompletedPart>,
    /// Part number for the next submission.
    next_part: i32,
}

impl MultipartUpload for S3MultipartUpload {
    fn upload_part(&mut self, body: &[u8]) -> Result<(), ObjectStoreError> {
        let part_number = self.next_part;
        let etag = self.runtime.block_on(async {
            let mut request = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .part_number(part_number)
                .body(ByteStream::from(body.to_vec()));
            if let Some(sse) = &self.sse {
                let headers = sse_headers(sse);
                request = request
                    .sse_customer_algorithm(SSE_ALGORITHM)
                    .sse_customer_key(headers.key)
                    .sse_customer_key_md5(headers.digest);
            }
            let output = request
                .send()
                .await
                .map_err(|err| classify(&err, &self.bucket, Some(&self.key)))?;
            output.e_tag().map(ToString::to_string).ok_or_else(|| {
                ObjectStoreError::Service(format!(
                    "bucket '{}' returned no etag for part {part_number} of key '{}'",
                    self.bucket, self.key
                ))
            })
        })?;
        self.parts
            .push(CompletedPart::builder().part_number(part_number).e_tag(etag).build());
        self.next_part += 1;
        Ok(())
    }

    fn complete(self: Box<Self>) -> Result<String, ObjectStoreError> {
        self.runtime.block_on(async {
            let output = self
                .client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(self.parts.clone()))
                        .build(),
                )
                .send()
                .await
                .map_err(|err| classify(&err, &self.bucket, Some(&self.key)))?;
            debug!(bucket = %self.bucket, key = %self.key, "completed multipart upload");
            output
                .version_id()
                .map(ToString::to_string)
                .ok_or_else(|| missing_version(&self.bucket, &self.key))
        })
    }

    fn abort(self: Box<Self>) -> Result<(), ObjectStoreError> {
        self.runtime.block_on(async {
            self.client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .send()
                .await
                .map_err(|err| classify(&err, &self.bucket, Some(&self.key)))?;
            debug!(bucket = %self.bucket, key = %self.key, "aborted multipart upload");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests;
