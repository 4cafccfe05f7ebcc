// crates/moorage-core/src/store.rs
// ============================================================================
// Module: Job Store Lifecycle
// Description: Store registry, resource binding and the CRUD surface.
// Purpose: Create/resume/destroy stores and expose job and file operations.
// Dependencies: tracing, uuid
// ============================================================================

//! ## Overview
//! One job store instance owns three backing resources derived from its
//! locator: a jobs domain, a files domain and a versioned bucket. A fourth,
//! shared registry domain records which stores exist so that `initialize`
//! and `resume` can detect each other's work across processes. The registry
//! keeps one item per name prefix with a single `exists` attribute:
//! `"True"` means the store is live, `"False"` means a transition
//! (initialize or destroy) is in flight, and an absent item means the
//! store does not exist.
//!
//! All CRUD goes through [`crate::file_record`] and [`crate::job_codec`],
//! so every mutation inherits their optimistic-concurrency guarantees.

use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::backend::AttributeStore;
use crate::backend::AttributeStoreError;
use crate::backend::ContentCipher;
use crate::backend::ObjectStore;
use crate::backend::ObjectStoreError;
use crate::backend::SseKey;
use crate::backend::VersioningState;
use crate::backend::attribute_transient;
use crate::backend::bucket_pending;
use crate::backend::domain_pending;
use crate::backend::object_transient;
use crate::codec::AttributeMap;
use crate::config::StoreConfig;
use crate::context::StoreContext;
use crate::error::JobStoreError;
use crate::file_record::FileId;
use crate::file_record::FileRecord;
use crate::file_record::OWNER_ATTRIBUTE;
use crate::file_record::VERSION_ATTRIBUTE;
use crate::job::JobDescriptor;
use crate::job::JobId;
use crate::job_codec;
use crate::locator::Locator;
use crate::pipes::PipeWriter;
use crate::retry::RetryPolicy;
use crate::retry::with_retry;

/// Shared registry domain, one per account rather than per store.
pub const REGISTRY_DOMAIN: &str = "moorage-registry";

/// Registry attribute recording a store's existence.
pub const EXISTS_ATTRIBUTE: &str = "exists";

/// Resource name suffix of the jobs domain.
const JOBS_SUFFIX: &str = "jobs";

/// Resource name suffix of the files domain and the bucket.
const FILES_SUFFIX: &str = "files";

/// Largest batch accepted by the attribute store's batch calls.
const BATCH_SIZE: usize = 25;

/// Owner sentinel for named shared files.
pub const SHARED_FILE_OWNER: &str = "shared-file";

/// Owner sentinel for stats payloads not yet consumed.
const STATS_PENDING_OWNER: &str = "stats-pending";

/// Owner sentinel for stats payloads that were already read.
const STATS_READ_OWNER: &str = "stats-read";

/// Namespace for deriving shared-file ids from their names.
const SHARED_FILE_NAMESPACE: Uuid = Uuid::from_u128(0x5b8c_b2a9_7d4e_4f21_9c3a_6e01_d2f4_8a17);

/// Registry view of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistryState {
    /// No registry item: the store does not exist.
    Absent,
    /// An initialize or destroy is (or was) in flight.
    Transitional,
    /// The store exists and can be resumed.
    Registered,
}

/// Injected collaborators of a job store.
pub struct Clients {
    /// Attribute store client.
    pub attribute_store: Arc<dyn AttributeStore>,
    /// Object store client.
    pub object_store: Arc<dyn ObjectStore>,
    /// Retry policy for transient backend failures.
    pub retry: Arc<dyn RetryPolicy>,
    /// Cipher for inlined content of encrypted records, when configured.
    pub cipher: Option<Arc<dyn ContentCipher>>,
}

/// One bound job store instance.
pub struct JobStore {
    /// Locator the store was bound with.
    locator: Locator,
    /// Shared handles passed down to records.
    context: Arc<StoreContext>,
    /// Domain holding job items.
    jobs_domain: String,
}

impl JobStore {
    /// Creates the backing resources and registers a brand-new store.
    ///
    /// The registry must currently report the store as non-existent. Any
    /// failure during creation triggers best-effort teardown of whatever
    /// was created before the error is re-raised.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::JobStoreExists`] when the registry already
    /// reports the store, and any creation failure otherwise.
    pub fn initialize(
        locator: Locator,
        config: StoreConfig,
        clients: Clients,
    ) -> Result<Self, JobStoreError> {
        config.validate()?;
        ensure_registry_domain(&*clients.attribute_store, &*clients.retry)?;
        if registry_state(&*clients.attribute_store, &*clients.retry, &locator)?
            == RegistryState::Registered
        {
            return Err(JobStoreError::JobStoreExists(locator.to_string()));
        }
        set_registry_state(
            &*clients.attribute_store,
            &*clients.retry,
            &locator,
            RegistryState::Transitional,
        )?;
        match Self::bind(locator.clone(), config, clients, true) {
            Ok(store) => {
                set_registry_state(
                    &*store.context.attribute_store,
                    &*store.context.retry,
                    &store.locator,
                    RegistryState::Registered,
                )?;
                debug!(locator = %store.locator, "initialized job store");
                Ok(store)
            },
            Err((clients, err)) => {
                warn!(locator = %locator, error = %err,
                    "initialize failed, tearing down partial resources");
                if let Err(cleanup_err) = teardown_resources(&clients, &locator) {
                    warn!(locator = %locator, error = %cleanup_err,
                        "cleanup after failed initialize also failed");
                }
                if let Err(cleanup_err) = set_registry_state(
                    &*clients.attribute_store,
                    &*clients.retry,
                    &locator,
                    RegistryState::Absent,
                ) {
                    warn!(locator = %locator, error = %cleanup_err,
                        "failed to deregister after failed initialize");
                }
                Err(err)
            },
        }
    }

    /// Binds to the pre-existing resources of a registered store.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchJobStore`] when the registry does not
    /// report the store as live, or when a backing resource is missing.
    pub fn resume(
        locator: Locator,
        config: StoreConfig,
        clients: Clients,
    ) -> Result<Self, JobStoreError> {
        config.validate()?;
        ensure_registry_domain(&*clients.attribute_store, &*clients.retry)?;
        if registry_state(&*clients.attribute_store, &*clients.retry, &locator)?
            != RegistryState::Registered
        {
            return Err(JobStoreError::NoSuchJobStore(locator.to_string()));
        }
        let store = Self::bind(locator, config, clients, false).map_err(|(_, err)| err)?;
        debug!(locator = %store.locator, "resumed job store");
        Ok(store)
    }

    /// Deletes the store and everything in it.
    ///
    /// The registry is flipped to the transitional state before any
    /// resource is touched, so a crash mid-destroy is visible to later
    /// `initialize`/`resume` attempts. Resources that are already gone are
    /// treated as successfully deleted.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when a still-existing resource cannot be
    /// deleted.
    pub fn destroy(self) -> Result<(), JobStoreError> {
        let clients = Clients {
            attribute_store: Arc::clone(&self.context.attribute_store),
            object_store: Arc::clone(&self.context.object_store),
            retry: Arc::clone(&self.context.retry),
            cipher: self.context.cipher.clone(),
        };
        set_registry_state(
            &*clients.attribute_store,
            &*clients.retry,
            &self.locator,
            RegistryState::Transitional,
        )?;
        teardown_resources(&clients, &self.locator)?;
        set_registry_state(
            &*clients.attribute_store,
            &*clients.retry,
            &self.locator,
            RegistryState::Absent,
        )?;
        debug!(locator = %self.locator, "destroyed job store");
        Ok(())
    }

    /// Binds the three backing resources, creating them when `create` is
    /// set. On failure the clients are handed back for cleanup.
    #[allow(clippy::result_large_err, reason = "Error path carries clients back for cleanup.")]
    fn bind(
        locator: Locator,
        config: StoreConfig,
        clients: Clients,
        create: bool,
    ) -> Result<Self, (Clients, JobStoreError)> {
        match Self::bind_inner(&locator, &config, &clients, create) {
            Ok(sse_key) => {
                let jobs_domain = locator.qualify(JOBS_SUFFIX);
                let context = Arc::new(StoreContext {
                    attribute_store: Arc::clone(&clients.attribute_store),
                    object_store: Arc::clone(&clients.object_store),
                    retry: Arc::clone(&clients.retry),
                    cipher: clients.cipher.clone(),
                    sse_key,
                    config,
                    files_domain: locator.qualify(FILES_SUFFIX),
                    bucket: locator.qualify(FILES_SUFFIX),
                });
                Ok(Self {
                    locator,
                    context,
                    jobs_domain,
                })
            },
            Err(err) => Err((clients, err)),
        }
    }

    /// Creates or checks the two domains and the versioned bucket.
    fn bind_inner(
        locator: &Locator,
        config: &StoreConfig,
        clients: &Clients,
        create: bool,
    ) -> Result<Option<SseKey>, JobStoreError> {
        let sse_key = match &config.sse_key_path {
            Some(path) => Some(SseKey::from_path(path)?),
            None => None,
        };
        for suffix in [JOBS_SUFFIX, FILES_SUFFIX] {
            bind_domain(clients, locator, &locator.qualify(suffix), create)?;
        }
        bind_bucket(clients, locator, config, create)?;
        Ok(sse_key)
    }

    // SECTION: Job CRUD
    // ========================================================================

    /// Persists a new job descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when encoding or the write fails.
    pub fn create_job(&self, job: &JobDescriptor) -> Result<(), JobStoreError> {
        let item = job_codec::job_to_item(&self.context, job)?;
        let item_name = job.id.to_string();
        with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.put_attributes(&self.jobs_domain, &item_name, &item)
        })?;
        debug!(job_id = %job.id, "created job");
        Ok(())
    }

    /// Reports whether a job exists.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the read fails.
    pub fn job_exists(&self, job_id: JobId) -> Result<bool, JobStoreError> {
        let item_name = job_id.to_string();
        let attributes = with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.get_attributes(&self.jobs_domain, &item_name)
        })?;
        Ok(!attributes.is_empty())
    }

    /// Loads a job descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchJob`] when the job item is absent.
    pub fn load_job(&self, job_id: JobId) -> Result<JobDescriptor, JobStoreError> {
        let item_name = job_id.to_string();
        let attributes = with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.get_attributes(&self.jobs_domain, &item_name)
        })?;
        if attributes.is_empty() {
            return Err(JobStoreError::NoSuchJob(item_name));
        }
        job_codec::job_from_item(&self.context, &attributes)
    }

    /// Overwrites a job descriptor.
    ///
    /// When the previous form of the job spilled into an overflow file that
    /// the new form no longer references, the stale file is deleted on a
    /// best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when encoding or the write fails.
    pub fn update_job(&self, job: &JobDescriptor) -> Result<(), JobStoreError> {
        let item_name = job.id.to_string();
        let previous = with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.get_attributes(&self.jobs_domain, &item_name)
        })?;
        let stale_overflow = job_codec::overlarge_file_id(&previous);

        let item = job_codec::job_to_item(&self.context, job)?;
        with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.put_attributes(&self.jobs_domain, &item_name, &item)
        })?;
        debug!(job_id = %job.id, "updated job");

        if let Some(stale_id) = stale_overflow
            && job_codec::overlarge_file_id(&item) != Some(stale_id)
            && let Err(err) = self.delete_file(stale_id)
        {
            warn!(job_id = %job.id, file_id = %stale_id, error = %err,
                "failed to delete superseded overflow file");
        }
        Ok(())
    }

    /// Deletes a job and every file it owns, including object versions.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when a delete fails.
    pub fn delete_job(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let item_name = job_id.to_string();
        with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.delete_item(&self.jobs_domain, &item_name)
        })?;
        debug!(job_id = %job_id, "deleted job");

        let owned = with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.query_by_attribute(
                &self.context.files_domain,
                OWNER_ATTRIBUTE,
                &item_name,
            )
        })?;
        if owned.is_empty() {
            return Ok(());
        }
        debug!(job_id = %job_id, count = owned.len(), "deleting files owned by job");
        let names: Vec<String> = owned.iter().map(|(name, _)| name.clone()).collect();
        for chunk in names.chunks(BATCH_SIZE) {
            with_retry(&*self.context.retry, attribute_transient, || {
                self.context.attribute_store.batch_delete_items(&self.context.files_domain, chunk)
            })?;
        }
        for (name, attributes) in &owned {
            if let Some(version) = attributes.get(VERSION_ATTRIBUTE)
                && !version.is_empty()
                && let Err(err) =
                    self.context.object_store.delete_version(&self.context.bucket, name, version)
            {
                warn!(file_id = name, version, error = %err,
                    "failed to delete object version of owned file");
            }
        }
        Ok(())
    }

    /// Loads every job in the store.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the scan or a decode fails.
    pub fn jobs(&self) -> Result<Vec<JobDescriptor>, JobStoreError> {
        let items = with_retry(&*self.context.retry, attribute_transient, || {
            self.context.attribute_store.list_items(&self.jobs_domain)
        })?;
        items
            .iter()
            .map(|(_, attributes)| job_codec::job_from_item(&self.context, attributes))
            .collect()
    }

    /// Starts a buffered job write batch.
    #[must_use]
    pub fn batch(&self) -> JobBatch<'_> {
        JobBatch {
            store: self,
            pending: Vec::new(),
        }
    }

    // SECTION: File CRUD
    // ========================================================================

    /// Uploads a local file and returns its new id.
    ///
    /// Files without an owning job belong to the shared-file owner and
    /// survive job deletion.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the upload or save fails.
    pub fn write_file(&self, path: &Path, owner: Option<JobId>) -> Result<FileId, JobStoreError> {
        let mut record = FileRecord::create(Arc::clone(&self.context), &owner_string(owner));
        record.upload(path, self.context.config.verify_checksums)?;
        record.save()?;
        Ok(record.file_id())
    }

    /// Streams a new file through a writer closure and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the transfer or save fails.
    pub fn write_file_stream(
        &self,
        owner: Option<JobId>,
        producer: impl FnOnce(&mut PipeWriter) -> Result<(), JobStoreError>,
    ) -> Result<FileId, JobStoreError> {
        let mut record = FileRecord::create(Arc::clone(&self.context), &owner_string(owner));
        record.upload_stream(producer)?;
        record.save()?;
        Ok(record.file_id())
    }

    /// Creates an empty file and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the save fails.
    pub fn empty_file(&self, owner: Option<JobId>) -> Result<FileId, JobStoreError> {
        self.write_file_stream(owner, |_| Ok(()))
    }

    /// Replaces the content of an existing file from a local file.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchFile`] when the file is absent, and
    /// [`JobStoreError::ConcurrentFileModification`] when another writer
    /// got there first.
    pub fn update_file(&self, file_id: FileId, path: &Path) -> Result<(), JobStoreError> {
        let mut record = FileRecord::load_or_fail(Arc::clone(&self.context), file_id)?;
        record.upload(path, self.context.config.verify_checksums)?;
        record.save()
    }

    /// Replaces the content of an existing file through a writer closure.
    ///
    /// # Errors
    ///
    /// See [`JobStore::update_file`].
    pub fn update_file_stream(
        &self,
        file_id: FileId,
        producer: impl FnOnce(&mut PipeWriter) -> Result<(), JobStoreError>,
    ) -> Result<(), JobStoreError> {
        let mut record = FileRecord::load_or_fail(Arc::clone(&self.context), file_id)?;
        record.upload_stream(producer)?;
        record.save()
    }

    /// Downloads a file's content into a local file.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchFile`] when the file is absent.
    pub fn read_file(&self, file_id: FileId, path: &Path) -> Result<(), JobStoreError> {
        let record = FileRecord::load_or_fail(Arc::clone(&self.context), file_id)?;
        record.download(path, self.context.config.verify_checksums)
    }

    /// Streams a file's content through a reader closure.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchFile`] when the file is absent.
    pub fn read_file_stream<T>(
        &self,
        file_id: FileId,
        consumer: impl FnOnce(&mut dyn Read) -> Result<T, JobStoreError>,
    ) -> Result<T, JobStoreError> {
        let record = FileRecord::load_or_fail(Arc::clone(&self.context), file_id)?;
        record.download_stream(self.context.config.verify_checksums, consumer)
    }

    /// Deletes a file; deleting an absent file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::ConcurrentFileModification`] when another
    /// writer changed the file concurrently.
    pub fn delete_file(&self, file_id: FileId) -> Result<(), JobStoreError> {
        match FileRecord::load(Arc::clone(&self.context), file_id)? {
            Some(record) => record.delete(),
            None => Ok(()),
        }
    }

    /// Reports whether a file exists.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the read fails.
    pub fn file_exists(&self, file_id: FileId) -> Result<bool, JobStoreError> {
        FileRecord::exists(&self.context, file_id)
    }

    /// Returns a file's content size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchFile`] when the file is absent.
    pub fn file_size(&self, file_id: FileId) -> Result<u64, JobStoreError> {
        FileRecord::load_or_fail(Arc::clone(&self.context), file_id)?.size()
    }

    // SECTION: Shared files
    // ========================================================================

    /// Writes (or overwrites) a named shared file through a writer closure.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::InvalidSharedFileName`] for invalid names.
    pub fn write_shared_file_stream(
        &self,
        name: &str,
        producer: impl FnOnce(&mut PipeWriter) -> Result<(), JobStoreError>,
    ) -> Result<(), JobStoreError> {
        let file_id = shared_file_id(name)?;
        let mut record = FileRecord::load_or_create(
            Arc::clone(&self.context),
            file_id,
            SHARED_FILE_OWNER,
            self.context.encryption_enabled(),
        )?;
        record.upload_stream(producer)?;
        record.save()
    }

    /// Streams a named shared file through a reader closure.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::NoSuchFile`] when the shared file was
    /// never written.
    pub fn read_shared_file_stream<T>(
        &self,
        name: &str,
        consumer: impl FnOnce(&mut dyn Read) -> Result<T, JobStoreError>,
    ) -> Result<T, JobStoreError> {
        let file_id = shared_file_id(name)?;
        let record = FileRecord::load_or_fail(Arc::clone(&self.context), file_id)?;
        record.download_stream(self.context.config.verify_checksums, consumer)
    }

    // SECTION: Stats files
    // ========================================================================

    /// Persists one stats payload for later draining.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the upload or save fails.
    pub fn write_stats(&self, payload: &[u8]) -> Result<FileId, JobStoreError> {
        let mut record = FileRecord::create(Arc::clone(&self.context), STATS_PENDING_OWNER);
        record.upload_stream(|writer| {
            writer.write_all(payload)?;
            Ok(())
        })?;
        record.save()?;
        Ok(record.file_id())
    }

    /// Drains stats payloads through `callback`, marking each as read.
    ///
    /// With `read_all` set, payloads that were already marked read are
    /// replayed as well (without flipping their owner again).
    ///
    /// Returns the number of payloads delivered.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when a read or the owner flip fails.
    pub fn read_stats(
        &self,
        mut callback: impl FnMut(&[u8]) -> Result<(), JobStoreError>,
        read_all: bool,
    ) -> Result<usize, JobStoreError> {
        let owners: &[&str] = if read_all {
            &[STATS_PENDING_OWNER, STATS_READ_OWNER]
        } else {
            &[STATS_PENDING_OWNER]
        };
        let mut delivered = 0;
        for owner in owners {
            let items = with_retry(&*self.context.retry, attribute_transient, || {
                self.context.attribute_store.query_by_attribute(
                    &self.context.files_domain,
                    OWNER_ATTRIBUTE,
                    owner,
                )
            })?;
            for (name, _) in items {
                let file_id = match FileId::parse(&name) {
                    Ok(file_id) => file_id,
                    Err(err) => {
                        warn!(item = name, error = %err, "skipping malformed stats item");
                        continue;
                    },
                };
                let Some(mut record) = FileRecord::load(Arc::clone(&self.context), file_id)?
                else {
                    // Drained by a concurrent reader.
                    continue;
                };
                let payload = record.download_stream(
                    self.context.config.verify_checksums,
                    |reader| {
                        let mut collected = Vec::new();
                        reader.read_to_end(&mut collected)?;
                        Ok(collected)
                    },
                )?;
                callback(&payload)?;
                delivered += 1;
                if *owner == STATS_PENDING_OWNER {
                    record.set_owner(STATS_READ_OWNER);
                    match record.save() {
                        Ok(()) => {},
                        Err(JobStoreError::ConcurrentFileModification(_)) => {
                            // A concurrent reader flipped it first.
                        },
                        Err(err) => return Err(err),
                    }
                }
            }
        }
        debug!(delivered, read_all, "drained stats payloads");
        Ok(delivered)
    }

    /// Returns the locator the store was bound with.
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }
}

/// Buffered job writes flushed in attribute-store batches.
///
/// Jobs buffered after the last flush are written by [`JobBatch::commit`];
/// dropping the batch without committing discards them.
pub struct JobBatch<'a> {
    /// Store the batch writes into.
    store: &'a JobStore,
    /// Encoded items waiting for the next flush.
    pending: Vec<(String, AttributeMap)>,
}

impl JobBatch<'_> {
    /// Buffers one job write, flushing when the batch is full.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when encoding or a flush fails.
    pub fn put_job(&mut self, job: &JobDescriptor) -> Result<(), JobStoreError> {
        let item = job_codec::job_to_item(&self.store.context, job)?;
        self.pending.push((job.id.to_string(), item));
        if self.pending.len() >= BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes all remaining buffered jobs.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError`] when the write fails.
    pub fn commit(mut self) -> Result<(), JobStoreError> {
        self.flush()
    }

    /// Flushes the current buffer in one batch call.
    fn flush(&mut self) -> Result<(), JobStoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let items = std::mem::take(&mut self.pending);
        let context = &self.store.context;
        with_retry(&*context.retry, attribute_transient, || {
            context.attribute_store.batch_put_attributes(&self.store.jobs_domain, &items)
        })?;
        debug!(count = items.len(), "flushed job batch");
        Ok(())
    }
}

/// Maps an optional owning job onto the owner attribute value.
fn owner_string(owner: Option<JobId>) -> String {
    owner.map_or_else(|| SHARED_FILE_OWNER.to_string(), |job_id| job_id.to_string())
}

/// Derives the deterministic file id of a named shared file.
///
/// # Errors
///
/// Returns [`JobStoreError::InvalidSharedFileName`] for invalid names.
fn shared_file_id(name: &str) -> Result<FileId, JobStoreError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if !valid {
        return Err(JobStoreError::InvalidSharedFileName(name.to_string()));
    }
    Ok(FileId::from_uuid(Uuid::new_v5(&SHARED_FILE_NAMESPACE, name.as_bytes())))
}

/// Creates the shared registry domain if it is missing.
fn ensure_registry_domain(
    attribute_store: &dyn AttributeStore,
    retry: &dyn RetryPolicy,
) -> Result<(), JobStoreError> {
    with_retry(retry, attribute_transient, || attribute_store.create_domain(REGISTRY_DOMAIN))?;
    Ok(())
}

/// Reads the registry state of one store.
fn registry_state(
    attribute_store: &dyn AttributeStore,
    retry: &dyn RetryPolicy,
    locator: &Locator,
) -> Result<RegistryState, JobStoreError> {
    let attributes = with_retry(retry, attribute_transient, || {
        attribute_store.get_attributes(REGISTRY_DOMAIN, locator.name_prefix())
    })?;
    let state = match attributes.get(EXISTS_ATTRIBUTE).map(String::as_str) {
        None => RegistryState::Absent,
        Some("True") => RegistryState::Registered,
        Some(_) => RegistryState::Transitional,
    };
    Ok(state)
}

/// Writes the registry state of one store.
fn set_registry_state(
    attribute_store: &dyn AttributeStore,
    retry: &dyn RetryPolicy,
    locator: &Locator,
    state: RegistryState,
) -> Result<(), JobStoreError> {
    let item_name = locator.name_prefix();
    match state {
        RegistryState::Absent => {
            with_retry(retry, attribute_transient, || {
                attribute_store.delete_item(REGISTRY_DOMAIN, item_name)
            })?;
        },
        RegistryState::Transitional | RegistryState::Registered => {
            let value = if state == RegistryState::Registered { "True" } else { "False" };
            let mut attributes = AttributeMap::new();
            attributes.insert(EXISTS_ATTRIBUTE.to_string(), value.to_string());
            with_retry(retry, attribute_transient, || {
                attribute_store.put_attributes(REGISTRY_DOMAIN, item_name, &attributes)
            })?;
        },
    }
    Ok(())
}

/// Creates or checks one attribute domain.
fn bind_domain(
    clients: &Clients,
    locator: &Locator,
    domain: &str,
    create: bool,
) -> Result<(), JobStoreError> {
    if create {
        with_retry(&*clients.retry, attribute_transient, || {
            clients.attribute_store.create_domain(domain)
        })?;
        // Domain creation is eventually consistent; wait until it reads
        // back before declaring the store bound.
        with_retry(&*clients.retry, domain_pending, || {
            if clients.attribute_store.domain_exists(domain)? {
                Ok(())
            } else {
                Err(AttributeStoreError::NoSuchDomain(domain.to_string()))
            }
        })?;
        return Ok(());
    }
    let exists = with_retry(&*clients.retry, attribute_transient, || {
        clients.attribute_store.domain_exists(domain)
    })?;
    if exists {
        Ok(())
    } else {
        Err(JobStoreError::NoSuchJobStore(locator.to_string()))
    }
}

/// Creates or checks the versioned bucket.
fn bind_bucket(
    clients: &Clients,
    locator: &Locator,
    config: &StoreConfig,
    create: bool,
) -> Result<(), JobStoreError> {
    let bucket = locator.qualify(FILES_SUFFIX);
    let exists = with_retry(&*clients.retry, object_transient, || {
        clients.object_store.bucket_exists(&bucket)
    })?;
    if !exists {
        if !create {
            return Err(JobStoreError::NoSuchJobStore(locator.to_string()));
        }
        debug!(bucket, region = locator.region(), "creating versioned bucket");
        with_retry(&*clients.retry, bucket_pending, || {
            clients.object_store.create_bucket(&bucket, locator.region())
        })?;
        with_retry(&*clients.retry, object_transient, || {
            clients.object_store.enable_versioning(&bucket)
        })?;
        poll_versioning(clients, config, &bucket)?;
    }
    let location = with_retry(&*clients.retry, object_transient, || {
        clients.object_store.bucket_location(&bucket)
    })?;
    if location != locator.region() {
        return Err(JobStoreError::LocationConflict {
            bucket,
            actual: location,
            expected: locator.region().to_string(),
        });
    }
    let state = with_retry(&*clients.retry, object_transient, || {
        clients.object_store.versioning_state(&bucket)
    })?;
    if state != VersioningState::Enabled {
        return Err(JobStoreError::VersioningConflict {
            bucket,
            state: state.to_string(),
        });
    }
    Ok(())
}

/// Polls a bucket until versioning reports enabled.
fn poll_versioning(
    clients: &Clients,
    config: &StoreConfig,
    bucket: &str,
) -> Result<(), JobStoreError> {
    for attempt in 0 .. config.versioning_poll_attempts {
        let state = with_retry(&*clients.retry, object_transient, || {
            clients.object_store.versioning_state(bucket)
        })?;
        if state == VersioningState::Enabled {
            return Ok(());
        }
        debug!(bucket, attempt, %state, "waiting for bucket versioning to activate");
        thread::sleep(config.versioning_poll_interval);
    }
    Err(JobStoreError::VersioningConflict {
        bucket: bucket.to_string(),
        state: "activation timed out".to_string(),
    })
}

/// Deletes the three backing resources; already-gone resources count as
/// successfully deleted.
fn teardown_resources(clients: &Clients, locator: &Locator) -> Result<(), JobStoreError> {
    let bucket = locator.qualify(FILES_SUFFIX);
    match clients.object_store.purge_bucket(&bucket) {
        Ok(()) | Err(ObjectStoreError::NoSuchBucket(_)) => {},
        Err(err) => return Err(err.into()),
    }
    match clients.object_store.delete_bucket(&bucket) {
        Ok(()) | Err(ObjectStoreError::NoSuchBucket(_)) => {},
        Err(err) => return Err(err.into()),
    }
    for suffix in [JOBS_SUFFIX, FILES_SUFFIX] {
        let domain = locator.qualify(suffix);
        match clients.attribute_store.delete_domain(&domain) {
            Ok(()) | Err(AttributeStoreError::NoSuchDomain(_)) => {},
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
