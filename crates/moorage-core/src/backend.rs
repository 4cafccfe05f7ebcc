// crates/moorage-core/src/backend.rs
// ============================================================================
// Module: Backend Seams
// Description: Injected attribute-store, object-store and cipher interfaces.
// Purpose: Decouple the storage layer from concrete cloud clients.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The job store never talks to a cloud SDK directly; it is handed an
//! [`AttributeStore`] and an [`ObjectStore`] at construction. The attribute
//! store must provide strongly consistent reads and conditional writes;
//! the object store must provide per-object version ids and multipart
//! uploads. Error enums carry enough shape for the per-resource transient
//! classification consumed by the retry seam.

use std::fmt;
use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::codec::AttributeMap;

/// Length of the customer-supplied encryption key in bytes.
pub const SSE_KEY_LEN: usize = 32;

/// Versioning state observed on an object-store bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersioningState {
    /// Versioning is active; every write yields a version id.
    Enabled,
    /// Versioning was enabled once and has been suspended.
    Suspended,
    /// Versioning has never been enabled.
    #[default]
    Unversioned,
}

impl fmt::Display for VersioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Enabled => "Enabled",
            Self::Suspended => "Suspended",
            Self::Unversioned => "Unversioned",
        };
        f.write_str(label)
    }
}

/// Precondition for a conditional attribute-store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedValue {
    /// The named attribute must be absent from the item.
    Absent,
    /// The named attribute must equal this value exactly.
    Is(String),
}

/// Attribute store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AttributeStoreError {
    /// The named domain does not exist.
    #[error("domain '{0}' does not exist")]
    NoSuchDomain(String),
    /// A conditional write precondition failed.
    #[error("conditional check failed for item '{item}'")]
    ConditionFailed {
        /// Name of the item whose precondition failed.
        item: String,
    },
    /// The service is briefly unavailable; safe to retry.
    #[error("attribute store unavailable: {0}")]
    Unavailable(String),
    /// Any other service-side failure.
    #[error("attribute store error: {0}")]
    Service(String),
}

/// Object store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The named bucket does not exist.
    #[error("bucket '{0}' does not exist")]
    NoSuchBucket(String),
    /// Creation raced with an earlier creation by the same owner.
    #[error("bucket '{0}' is already owned by this account")]
    BucketAlreadyOwnedByYou(String),
    /// A conflicting conditional operation is in progress; safe to retry.
    #[error("operation aborted on bucket '{0}'")]
    OperationAborted(String),
    /// The named key (or version) does not exist in the bucket.
    #[error("key '{key}' not found in bucket '{bucket}'")]
    NoSuchKey {
        /// Bucket that was queried.
        bucket: String,
        /// Object key that was not found.
        key: String,
    },
    /// The service is briefly unavailable; safe to retry.
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    /// Any other service-side failure.
    #[error("object store error: {0}")]
    Service(String),
    /// Local I/O failure while moving bytes.
    #[error("object store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content cipher errors.
#[derive(Debug, Error)]
#[error("cipher error: {0}")]
pub struct CipherError(pub String);

/// Whether an attribute-store error is transient for plain item operations.
#[must_use]
pub const fn attribute_transient(error: &AttributeStoreError) -> bool {
    matches!(error, AttributeStoreError::Unavailable(_))
}

/// Whether an attribute-store error is transient while binding a domain
/// that is expected to appear (creation is eventually consistent).
#[must_use]
pub const fn domain_pending(error: &AttributeStoreError) -> bool {
    matches!(
        error,
        AttributeStoreError::NoSuchDomain(_) | AttributeStoreError::Unavailable(_)
    )
}

/// Whether an object-store error is transient for plain object operations.
#[must_use]
pub const fn object_transient(error: &ObjectStoreError) -> bool {
    matches!(error, ObjectStoreError::Unavailable(_))
}

/// Whether an object-store error is transient while creating or binding a
/// bucket (bucket creation races resolve on retry).
#[must_use]
pub const fn bucket_pending(error: &ObjectStoreError) -> bool {
    matches!(
        error,
        ObjectStoreError::NoSuchBucket(_)
            | ObjectStoreError::BucketAlreadyOwnedByYou(_)
            | ObjectStoreError::OperationAborted(_)
            | ObjectStoreError::Unavailable(_)
    )
}

/// Schema-less item store with strongly consistent conditional writes.
///
/// All reads are consistent reads. A missing item reads back as an empty
/// attribute map, matching the underlying store's semantics.
pub trait AttributeStore: Send + Sync {
    /// Creates a domain; creating an existing domain is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when creation fails.
    fn create_domain(&self, domain: &str) -> Result<(), AttributeStoreError>;

    /// Deletes a domain and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError::NoSuchDomain`] when absent.
    fn delete_domain(&self, domain: &str) -> Result<(), AttributeStoreError>;

    /// Reports whether a domain exists.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the check fails.
    fn domain_exists(&self, domain: &str) -> Result<bool, AttributeStoreError>;

    /// Reads all attributes of an item with a consistent read.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the read fails.
    fn get_attributes(&self, domain: &str, item: &str) -> Result<AttributeMap, AttributeStoreError>;

    /// Writes attributes onto an item unconditionally. Attributes not
    /// named in the map keep their current values.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the write fails.
    fn put_attributes(
        &self,
        domain: &str,
        item: &str,
        attributes: &AttributeMap,
    ) -> Result<(), AttributeStoreError>;

    /// Writes attributes onto an item when the precondition on the named
    /// attribute holds. Attributes not named in the map keep their current
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError::ConditionFailed`] when the
    /// precondition does not hold.
    fn put_attributes_conditional(
        &self,
        domain: &str,
        item: &str,
        attributes: &AttributeMap,
        expected_name: &str,
        expected: &ExpectedValue,
    ) -> Result<(), AttributeStoreError>;

    /// Writes several items in one call.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the write fails.
    fn batch_put_attributes(
        &self,
        domain: &str,
        items: &[(String, AttributeMap)],
    ) -> Result<(), AttributeStoreError>;

    /// Deletes an item; deleting an absent item is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the delete fails.
    fn delete_item(&self, domain: &str, item: &str) -> Result<(), AttributeStoreError>;

    /// Deletes an item when the precondition on the named attribute holds.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError::ConditionFailed`] when the
    /// precondition does not hold.
    fn delete_item_conditional(
        &self,
        domain: &str,
        item: &str,
        expected_name: &str,
        expected: &ExpectedValue,
    ) -> Result<(), AttributeStoreError>;

    /// Deletes specific attributes from an item.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the delete fails.
    fn delete_attributes(
        &self,
        domain: &str,
        item: &str,
        names: &[String],
    ) -> Result<(), AttributeStoreError>;

    /// Deletes several items in one call; absent items are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the delete fails.
    fn batch_delete_items(&self, domain: &str, items: &[String])
    -> Result<(), AttributeStoreError>;

    /// Lists every item in a domain with a consistent read.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the scan fails.
    fn list_items(&self, domain: &str)
    -> Result<Vec<(String, AttributeMap)>, AttributeStoreError>;

    /// Lists the items whose named attribute equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeStoreError`] when the query fails.
    fn query_by_attribute(
        &self,
        domain: &str,
        name: &str,
        value: &str,
    ) -> Result<Vec<(String, AttributeMap)>, AttributeStoreError>;
}

/// One multipart upload in progress.
///
/// A handle that fails mid-stream MUST be aborted before the error is
/// propagated; an open multipart upload otherwise leaks storage
/// indefinitely.
pub trait MultipartUpload: Send {
    /// Uploads the next part. Parts are submitted in order.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the part upload fails.
    fn upload_part(&mut self, body: &[u8]) -> Result<(), ObjectStoreError>;

    /// Finalizes the upload and returns the new object version id.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when completion fails.
    fn complete(self: Box<Self>) -> Result<String, ObjectStoreError>;

    /// Cancels the upload, discarding all uploaded parts.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the abort call fails.
    fn abort(self: Box<Self>) -> Result<(), ObjectStoreError>;
}

/// Versioned blob store with multipart uploads.
pub trait ObjectStore: Send + Sync {
    /// Creates a bucket in the given region.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when creation fails; see
    /// [`bucket_pending`] for the retryable creation races.
    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ObjectStoreError>;

    /// Reports whether a bucket exists.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the check fails.
    fn bucket_exists(&self, bucket: &str) -> Result<bool, ObjectStoreError>;

    /// Returns the region a bucket is located in.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the lookup fails.
    fn bucket_location(&self, bucket: &str) -> Result<String, ObjectStoreError>;

    /// Deletes an empty bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::NoSuchBucket`] when absent.
    fn delete_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError>;

    /// Deletes every object, every object version, and cancels every open
    /// multipart upload in a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the purge fails.
    fn purge_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError>;

    /// Requests that versioning be enabled on a bucket. Activation is
    /// eventually consistent; poll [`ObjectStore::versioning_state`].
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the request fails.
    fn enable_versioning(&self, bucket: &str) -> Result<(), ObjectStoreError>;

    /// Reports the observed versioning state of a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the lookup fails.
    fn versioning_state(&self, bucket: &str) -> Result<VersioningState, ObjectStoreError>;

    /// Writes an object in one call and returns its new version id.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the write fails.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        sse: Option<&SseKey>,
    ) -> Result<String, ObjectStoreError>;

    /// Starts a multipart upload for a key.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when initiation fails.
    fn start_multipart(
        &self,
        bucket: &str,
        key: &str,
        sse: Option<&SseKey>,
    ) -> Result<Box<dyn MultipartUpload>, ObjectStoreError>;

    /// Streams one object version into `writable`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the read fails.
    fn read_object(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
        sse: Option<&SseKey>,
        writable: &mut dyn Write,
    ) -> Result<u64, ObjectStoreError>;

    /// Returns the size of one object version in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the lookup fails.
    fn object_size(&self, bucket: &str, key: &str, version: &str)
    -> Result<u64, ObjectStoreError>;

    /// Deletes one object version.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the delete fails.
    fn delete_version(&self, bucket: &str, key: &str, version: &str)
    -> Result<(), ObjectStoreError>;
}

/// Symmetric content-encryption key supplied by configuration.
///
/// # Invariants
/// - Always exactly [`SSE_KEY_LEN`] bytes.
#[derive(Clone)]
pub struct SseKey([u8; SSE_KEY_LEN]);

impl SseKey {
    /// Wraps a raw key.
    #[must_use]
    pub const fn new(bytes: [u8; SSE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Loads a key from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be read or is not exactly
    /// [`SSE_KEY_LEN`] bytes long.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let raw: [u8; SSE_KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("encryption key must be {SSE_KEY_LEN} bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self(raw))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SSE_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.write_str("SseKey(..)")
    }
}

/// Symmetric cipher applied to inlined content of encrypted file records.
///
/// Key management lives outside this crate; implementations are injected
/// alongside the backing stores.
pub trait ContentCipher: Send + Sync {
    /// Encrypts inlined content before it is chunk-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] when encryption fails.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decrypts inlined content read back from an item.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] when decryption fails.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}
