// crates/moorage-core/src/file_record.rs
// ============================================================================
// Module: File Record
// Description: Versioned representation of one stored file.
// Purpose: Optimistic-concurrency save/load/delete plus streamed transfers.
// Dependencies: tempfile, tracing, uuid
// ============================================================================

//! ## Overview
//! One file is one attribute-store item plus, when the content is too large
//! to inline, one versioned object under the same id. The item carries the
//! owner, the encryption flag, the checksum, the current object version, a
//! save-generation counter and any inlined content chunks. Every save and
//! delete is a conditional write keyed on the generation counter the record
//! saw when it was loaded, so two racing writers cannot silently overwrite
//! each other even when both would persist identical inline placements.
//!
//! Content placement after an upload is exactly one of: inlined chunks
//! (`version` is the empty string) or a real object version (`content` is
//! absent). Uploads stream through [`crate::pipes`]; the transfer worker
//! decides between inlining, a single object write and a multipart upload
//! based on how much the first part read actually yielded.

use std::fmt;
use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tempfile::NamedTempFile;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::backend::AttributeStoreError;
use crate::backend::CipherError;
use crate::backend::ExpectedValue;
use crate::backend::MultipartUpload;
use crate::backend::attribute_transient;
use crate::backend::object_transient;
use crate::checksum::ChecksumError;
use crate::checksum::RollingChecksum;
use crate::codec;
use crate::codec::AttributeMap;
use crate::context::StoreContext;
use crate::error::JobStoreError;
use crate::pipes;
use crate::pipes::PipeReader;
use crate::pipes::PipeWriter;
use crate::pipes::VerifyingReader;
use crate::retry::with_retry;

/// Attribute naming the job that owns a file.
pub const OWNER_ATTRIBUTE: &str = "ownerID";
/// Attribute recording whether the content is encrypted.
pub const ENCRYPTED_ATTRIBUTE: &str = "encrypted";
/// Attribute holding the current object version; empty when inlined.
pub const VERSION_ATTRIBUTE: &str = "version";
/// Attribute counting saves of the item; every conditional write keys on it.
pub const GENERATION_ATTRIBUTE: &str = "generation";
/// Attribute holding the content checksum; empty when none was computed.
pub const CHECKSUM_ATTRIBUTE: &str = "checksum";

/// Unique identifier of one stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(Uuid);

impl FileId {
    /// Generates a fresh random file id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an externally derived id, e.g. a name-based shared-file id.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a file id from its string form.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for malformed input.
    pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(raw).map(Self)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Placement produced by a finished upload transfer.
struct UploadOutcome {
    /// Inlined content, when the payload fit the inline budget.
    content: Option<Vec<u8>>,
    /// Object version, when the payload went to the object store.
    version: Option<String>,
    /// Checksum of the streamed bytes; empty for inlined content.
    checksum: String,
}

/// One stored file: metadata item plus optional object version.
///
/// # Invariants
/// - After an upload, exactly one of `content` and a non-empty `version`
///   is set.
/// - `previous_version` mirrors the version attribute currently persisted,
///   and is `None` only while the item has never been saved.
/// - `previous_generation` mirrors the generation attribute currently
///   persisted; saves and deletes condition on it, so the precondition
///   stays distinct per save even when successive versions are equal, as
///   they are for inlined content.
pub struct FileRecord {
    /// Shared backend handles and configuration.
    context: Arc<StoreContext>,
    /// Identifier the file is stored under.
    file_id: FileId,
    /// Id of the job owning this file, or a sentinel owner.
    owner_id: String,
    /// Whether content is encrypted at rest.
    encrypted: bool,
    /// Current version: `None` before any upload, empty when inlined,
    /// otherwise a real object version id.
    version: Option<String>,
    /// Version attribute value the persisted item is expected to hold.
    previous_version: Option<String>,
    /// Generation attribute value the persisted item is expected to hold.
    previous_generation: Option<String>,
    /// Inlined plaintext content, when present.
    content: Option<Vec<u8>>,
    /// Checksum string, empty when none was computed.
    checksum: String,
    /// Chunk count currently persisted, for trailing-chunk cleanup.
    num_content_chunks: usize,
}

impl FileRecord {
    /// Creates a fresh unsaved record owned by `owner_id`.
    #[must_use]
    pub fn create(context: Arc<StoreContext>, owner_id: &str) -> Self {
        let encrypted = context.encryption_enabled();
        Self {
            context,
            file_id: FileId::new(),
            owner_id: owner_id.to_string(),
            encrypted,
            version: None,
            previous_version: None,
            previous_generation: None,
            content: None,
            checksum: String::new(),
            num_content_chunks: 0,
        }
    }

    /// Loads a record from its persisted item, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the read fails or the item is not a
    /// valid file item.
    pub fn load(context: Arc<StoreContext>, file_id: FileId) -> Result<Option<Self>, JobStoreError> {
        let item_name = file_id.to_string();
        let attributes = with_retry(&*context.retry, attribute_transient, || {
            context.attribute_store.get_attributes(&context.files_domain, &item_name)
        })?;
        if attributes.is_empty() {
            return Ok(None);
        }
        Self::from_item(context, file_id, &attributes).map(Some)
    }

    /// Loads a record, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchFile`] when the item is absent.
    pub fn load_or_fail(context: Arc<StoreContext>, file_id: FileId) -> Result<Self, JobStoreError> {
        Self::load(context, file_id)?.ok_or_else(|| JobStoreError::NoSuchFile(file_id.to_string()))
    }

    /// Loads a record, synthesizing a fresh one when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the read fails.
    pub fn load_or_create(
        context: Arc<StoreContext>,
        file_id: FileId,
        owner_id: &str,
        encrypted: bool,
    ) -> Result<Self, JobStoreError> {
        if let Some(record) = Self::load(Arc::clone(&context), file_id)? {
            return Ok(record);
        }
        Ok(Self {
            context,
            file_id,
            owner_id: owner_id.to_string(),
            encrypted,
            version: None,
            previous_version: None,
            previous_generation: None,
            content: None,
            checksum: String::new(),
            num_content_chunks: 0,
        })
    }

    /// Reports whether a file item exists.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the read fails.
    pub fn exists(context: &StoreContext, file_id: FileId) -> Result<bool, JobStoreError> {
        let item_name = file_id.to_string();
        let attributes = with_retry(&*context.retry, attribute_transient, || {
            context.attribute_store.get_attributes(&context.files_domain, &item_name)
        })?;
        Ok(!attributes.is_empty())
    }

    /// Reconstructs a record from its item attributes.
    fn from_item(
        context: Arc<StoreContext>,
        file_id: FileId,
        attributes: &AttributeMap,
    ) -> Result<Self, JobStoreError> {
        let owner_id = attributes.get(OWNER_ATTRIBUTE).cloned().ok_or_else(|| {
            JobStoreError::IncompatibleSchema(format!(
                "file item {file_id} has no {OWNER_ATTRIBUTE} attribute"
            ))
        })?;
        let encrypted = attributes.get(ENCRYPTED_ATTRIBUTE).map(String::as_str) == Some("True");
        let stored_version = attributes.get(VERSION_ATTRIBUTE).cloned().unwrap_or_default();
        let stored_generation = attributes.get(GENERATION_ATTRIBUTE).cloned();
        let checksum = attributes.get(CHECKSUM_ATTRIBUTE).cloned().unwrap_or_default();
        let (payload, num_content_chunks) = codec::attributes_to_binary(attributes)?;
        let content = match payload {
            Some(raw) if encrypted => Some(decrypt_inline(&context, &raw)?),
            other => other,
        };
        Ok(Self {
            context,
            file_id,
            owner_id,
            encrypted,
            version: Some(stored_version.clone()),
            previous_version: Some(stored_version),
            previous_generation: stored_generation,
            content,
            checksum,
            num_content_chunks,
        })
    }

    /// Returns the file id.
    #[must_use]
    pub const fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Returns the owner id.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Whether content is encrypted at rest.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Reassigns the owner; takes effect on the next save.
    pub(crate) fn set_owner(&mut self, owner_id: &str) {
        self.owner_id = owner_id.to_string();
    }

    /// Current version: `None` before any upload, empty when inlined.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Inlined plaintext content, when present.
    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Checksum string, empty when none was computed.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Whether the content lives in the object store.
    fn has_object(&self) -> bool {
        self.version.as_deref().is_some_and(|version| !version.is_empty())
    }

    /// Size of the content in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the object-size lookup fails.
    pub fn size(&self) -> Result<u64, JobStoreError> {
        if let Some(content) = &self.content {
            return Ok(content.len() as u64);
        }
        if let Some(version) = self.version.as_deref()
            && !version.is_empty()
        {
            let key = self.file_id.to_string();
            let size = with_retry(&*self.context.retry, object_transient, || {
                self.context.object_store.object_size(&self.context.bucket, &key, version)
            })?;
            return Ok(size);
        }
        Ok(0)
    }

    /// Persists the record with a conditional write on the generation
    /// attribute.
    ///
    /// On success the superseded object version, if any, is deleted on a
    /// best-effort basis and stale trailing chunk attributes are removed.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::ConcurrentFileModification`] when another
    /// writer saved the record first.
    pub fn save(&mut self) -> Result<(), JobStoreError> {
        let payload = match &self.content {
            Some(plain) if self.encrypted => Some(encrypt_inline(&self.context, plain)?),
            Some(plain) => Some(plain.clone()),
            None => None,
        };
        let (mut attributes, new_chunks) = codec::binary_to_attributes(payload.as_deref())?;
        attributes.insert(OWNER_ATTRIBUTE.to_string(), self.owner_id.clone());
        attributes.insert(ENCRYPTED_ATTRIBUTE.to_string(), bool_attribute(self.encrypted));
        let stored_version = self.version.clone().unwrap_or_default();
        attributes.insert(VERSION_ATTRIBUTE.to_string(), stored_version.clone());
        let new_generation = next_generation(self.previous_generation.as_deref())?;
        attributes.insert(GENERATION_ATTRIBUTE.to_string(), new_generation.clone());
        attributes.insert(CHECKSUM_ATTRIBUTE.to_string(), self.checksum.clone());

        let item_name = self.file_id.to_string();
        let expected = self.expected_generation();
        let result = with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.put_attributes_conditional(
                &self.context.files_domain,
                &item_name,
                &attributes,
                GENERATION_ATTRIBUTE,
                &expected,
            )
        });
        match result {
            Ok(()) => {},
            Err(AttributeStoreError::ConditionFailed { .. }) => {
                return Err(JobStoreError::ConcurrentFileModification(item_name));
            },
            Err(err) => return Err(err.into()),
        }
        debug!(file_id = %self.file_id, version = %stored_version, "saved file record");

        if let Some(previous) = self.previous_version.as_deref()
            && !previous.is_empty()
            && Some(previous) != self.version.as_deref()
            && let Err(err) = self.context.object_store.delete_version(
                &self.context.bucket,
                &item_name,
                previous,
            )
        {
            warn!(file_id = %self.file_id, version = previous, error = %err,
                "failed to delete superseded object version");
        }

        if new_chunks < self.num_content_chunks {
            let stale: Vec<String> =
                (new_chunks .. self.num_content_chunks).map(codec::chunk_name).collect();
            if let Err(err) = self.context.attribute_store.delete_attributes(
                &self.context.files_domain,
                &item_name,
                &stale,
            ) {
                warn!(file_id = %self.file_id, error = %err, "failed to delete stale chunks");
            }
        }
        self.num_content_chunks = new_chunks;
        self.previous_version = Some(stored_version);
        self.previous_generation = Some(new_generation);
        Ok(())
    }

    /// Deletes the record and, best effort, its object version.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::ConcurrentFileModification`] when another
    /// writer changed the record since it was loaded.
    pub fn delete(self) -> Result<(), JobStoreError> {
        let item_name = self.file_id.to_string();
        let expected = self.expected_generation();
        let result = with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.delete_item_conditional(
                &self.context.files_domain,
                &item_name,
                GENERATION_ATTRIBUTE,
                &expected,
            )
        });
        match result {
            Ok(()) => {},
            Err(AttributeStoreError::ConditionFailed { .. }) => {
                return Err(JobStoreError::ConcurrentFileModification(item_name));
            },
            Err(err) => return Err(err.into()),
        }
        if let Some(previous) = self.previous_version.as_deref()
            && !previous.is_empty()
            && let Err(err) =
                self.context.object_store.delete_version(&self.context.bucket, &item_name, previous)
        {
            warn!(file_id = %self.file_id, version = previous, error = %err,
                "failed to delete object version of deleted file");
        }
        debug!(file_id = %self.file_id, "deleted file record");
        Ok(())
    }

    /// Precondition matching the generation attribute as last observed.
    fn expected_generation(&self) -> ExpectedValue {
        match &self.previous_generation {
            Some(generation) => ExpectedValue::Is(generation.clone()),
            None => ExpectedValue::Absent,
        }
    }

    /// Streams content into the record through a writer closure.
    ///
    /// The closure writes the payload; placement (inline, single object
    /// write or multipart upload) is decided by the transfer worker. The
    /// record is updated but not saved.
    ///
    /// # Errors
    ///
    /// Returns the closure's error or the transfer worker's error.
    pub fn upload_stream(
        &mut self,
        producer: impl FnOnce(&mut PipeWriter) -> Result<(), JobStoreError>,
    ) -> Result<(), JobStoreError> {
        let context = &self.context;
        let key = self.file_id.to_string();
        let encrypted = self.encrypted;
        let outcome = pipes::run_writable(
            move |reader| upload_worker(context, &key, encrypted, reader),
            producer,
        )?;
        self.content = outcome.content;
        self.version = outcome.version;
        self.checksum = outcome.checksum;
        Ok(())
    }

    /// Streams the content out of the record through a reader closure.
    ///
    /// Inline content is served directly; object content is streamed
    /// through a transfer worker. With `verify` set and a stored checksum
    /// present, fully consumed streams are verified; a consumer that stops
    /// early skips verification.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, a transfer error, or
    /// [`JobStoreError::Checksum`] on a verification failure.
    pub fn download_stream<T>(
        &self,
        verify: bool,
        consumer: impl FnOnce(&mut dyn Read) -> Result<T, JobStoreError>,
    ) -> Result<T, JobStoreError> {
        let expected =
            (verify && !self.checksum.is_empty()).then_some(self.checksum.as_str());
        if self.has_object() {
            let context = &self.context;
            let key = self.file_id.to_string();
            let version = self.version.clone().unwrap_or_default();
            let encrypted = self.encrypted;
            return pipes::run_readable(
                move |writer| download_worker(context, &key, &version, encrypted, writer),
                |reader| {
                    let mut verifying =
                        VerifyingReader::new(reader, expected).map_err(JobStoreError::Checksum)?;
                    let value = consumer(&mut verifying)?;
                    verifying.verify()?;
                    Ok(value)
                },
            );
        }
        let inline: &[u8] = self.content.as_deref().unwrap_or_default();
        let mut verifying =
            VerifyingReader::new(inline, expected).map_err(JobStoreError::Checksum)?;
        let value = consumer(&mut verifying)?;
        verifying.verify()?;
        Ok(value)
    }

    /// Uploads a local file into the record. The record is updated but not
    /// saved.
    ///
    /// With `verify` unset, no checksum is recorded and later downloads
    /// skip verification.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the file cannot be read or the
    /// transfer fails.
    pub fn upload(&mut self, path: &Path, verify: bool) -> Result<(), JobStoreError> {
        let mut file = File::open(path)?;
        self.upload_stream(|writer| {
            io::copy(&mut file, writer)?;
            Ok(())
        })?;
        if !verify {
            self.checksum.clear();
        }
        Ok(())
    }

    /// Downloads the content into a local file.
    ///
    /// The transfer lands in a temporary sibling file that only replaces
    /// `path` after the stream completed and verified, so a failed
    /// download never leaves a partial file behind. Checksum mismatches
    /// are retried within the retry policy's budget.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the transfer keeps failing.
    pub fn download(&self, path: &Path, verify: bool) -> Result<(), JobStoreError> {
        let mut attempt = 0;
        loop {
            match self.download_once(path, verify) {
                Ok(()) => return Ok(()),
                Err(JobStoreError::Checksum(ChecksumError::Mismatch { expected, actual })) => {
                    let Some(delay) = self.context.retry.backoff(attempt) else {
                        return Err(JobStoreError::Checksum(ChecksumError::Mismatch {
                            expected,
                            actual,
                        }));
                    };
                    warn!(file_id = %self.file_id, attempt, "checksum mismatch, retrying download");
                    thread::sleep(delay);
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// One download attempt into a temporary file.
    fn download_once(&self, path: &Path, verify: bool) -> Result<(), JobStoreError> {
        let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut staging = NamedTempFile::new_in(directory)?;
        self.download_stream(verify, |reader| {
            io::copy(reader, staging.as_file_mut())?;
            Ok(())
        })?;
        staging.persist(path).map_err(|err| JobStoreError::Io(err.error))?;
        Ok(())
    }
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRecord")
            .field("file_id", &self.file_id)
            .field("owner_id", &self.owner_id)
            .field("encrypted", &self.encrypted)
            .field("version", &self.version)
            .field("previous_version", &self.previous_version)
            .field("previous_generation", &self.previous_generation)
            .field("content_len", &self.content.as_ref().map(Vec::len))
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// Renders a boolean in its attribute form.
fn bool_attribute(value: bool) -> String {
    if value { "True".to_string() } else { "False".to_string() }
}

/// Generation value the next save writes: one past the persisted value, or
/// zero for an item that has never been saved.
fn next_generation(previous: Option<&str>) -> Result<String, JobStoreError> {
    let Some(raw) = previous else {
        return Ok("0".to_string());
    };
    let current: u64 = raw.parse().map_err(|_| {
        JobStoreError::IncompatibleSchema(format!(
            "generation attribute '{raw}' is not an integer"
        ))
    })?;
    Ok(current.wrapping_add(1).to_string())
}

/// Applies the content cipher to inlined plaintext, when one is configured.
fn encrypt_inline(context: &StoreContext, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
    match &context.cipher {
        Some(cipher) => cipher.encrypt(plain),
        None => Ok(plain.to_vec()),
    }
}

/// Inverts the content cipher on inlined content, when one is configured.
fn decrypt_inline(context: &StoreContext, raw: &[u8]) -> Result<Vec<u8>, CipherError> {
    match &context.cipher {
        Some(cipher) => cipher.decrypt(raw),
        None => Ok(raw.to_vec()),
    }
}

/// Upload transfer worker: drains the pipe and places the content.
///
/// The first part read decides the strategy. A first read that already hit
/// end-of-stream and fits the inline budget is inlined; a short first read
/// beyond the budget becomes a single object write; anything else becomes
/// a multipart upload. An exactly-part-sized stream therefore always goes
/// through the object store, even when the part size is below the inline
/// budget. Only object placements record a checksum; inlined content is
/// read back from the item itself and carries an empty checksum.
fn upload_worker(
    context: &StoreContext,
    key: &str,
    encrypted: bool,
    mut reader: PipeReader,
) -> Result<UploadOutcome, JobStoreError> {
    let part_size = usize::try_from(context.config.part_size).map_err(|_| {
        JobStoreError::InvalidConfig(format!(
            "part_size {} does not fit this platform",
            context.config.part_size
        ))
    })?;
    let sse = if encrypted { context.sse() } else { None };
    let mut rolling = RollingChecksum::new();

    let mut first = vec![0u8; part_size];
    let length = pipes::read_full(&mut reader, &mut first)?;
    first.truncate(length);
    rolling.update(&first);

    if length < part_size {
        // The whole stream fit into one part.
        if length <= context.config.max_inlined_size {
            debug!(key, size = length, "inlining file content");
            return Ok(UploadOutcome {
                content: Some(first),
                version: Some(String::new()),
                checksum: String::new(),
            });
        }
        debug!(key, size = length, "writing file content as a single object");
        let version = with_retry(&*context.retry, object_transient, || {
            context.object_store.put_object(&context.bucket, key, &first, sse)
        })?;
        let checksum = rolling.finish()?;
        return Ok(UploadOutcome {
            content: None,
            version: Some(version),
            checksum,
        });
    }

    let mut upload = context.object_store.start_multipart(&context.bucket, key, sse)?;
    match feed_parts(&mut *upload, &mut reader, &mut rolling, first, part_size) {
        Ok(()) => {
            let version = upload.complete()?;
            debug!(key, version, "completed multipart upload");
            let checksum = rolling.finish()?;
            Ok(UploadOutcome {
                content: None,
                version: Some(version),
                checksum,
            })
        },
        Err(err) => {
            // Never leave a dangling multipart upload behind.
            if let Err(abort_err) = upload.abort() {
                warn!(key, error = %abort_err, "failed to abort multipart upload");
            }
            Err(err)
        },
    }
}

/// Feeds the remaining stream into a multipart upload, part by part.
fn feed_parts(
    upload: &mut dyn MultipartUpload,
    reader: &mut PipeReader,
    rolling: &mut RollingChecksum,
    first: Vec<u8>,
    part_size: usize,
) -> Result<(), JobStoreError> {
    let mut part = first;
    let mut part_number = 1u32;
    loop {
        debug!(part_number, size = part.len(), "uploading part");
        upload.upload_part(&part)?;
        let mut next = vec![0u8; part_size];
        let length = pipes::read_full(reader, &mut next)?;
        if length == 0 {
            return Ok(());
        }
        next.truncate(length);
        rolling.update(&next);
        part = next;
        part_number += 1;
    }
}

/// Download transfer worker: streams one object version into the pipe.
///
/// A broken pipe means the consumer stopped reading on purpose and is not
/// an error.
fn download_worker(
    context: &StoreContext,
    key: &str,
    version: &str,
    encrypted: bool,
    mut writer: PipeWriter,
) -> Result<(), JobStoreError> {
    let sse = if encrypted { context.sse() } else { None };
    // No mid-stream retry: bytes already handed to the consumer cannot be
    // unwound, so a failed read surfaces and the caller restarts whole.
    let outcome = context
        .object_store
        .read_object(&context.bucket, key, version, sse, &mut writer)
        .map_err(JobStoreError::from)
        .and_then(|_| writer.finish().map_err(JobStoreError::from));
    match outcome {
        Ok(()) => Ok(()),
        Err(_) if writer.consumer_gone() => Ok(()),
        Err(err) => Err(err),
    }
}
