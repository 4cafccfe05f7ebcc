// crates/moorage-core/src/memory.rs
// ============================================================================
// Module: In-Memory Backends
// Description: Process-local implementations of the backend seams.
// Purpose: Strongly consistent test doubles for the storage traits.
// Dependencies: (internal seams only)
// ============================================================================

//! ## Overview
//! [`MemoryAttributeStore`] and [`MemoryObjectStore`] implement the backend
//! seams over mutex-guarded maps. Both are trivially strongly consistent,
//! which is exactly the consistency contract the real backends must meet.
//! The object store additionally records multipart part sizes and offers a
//! corruption hook so integrity handling can be exercised end to end.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::backend::AttributeStore;
use crate::backend::AttributeStoreError;
use crate::backend::ExpectedValue;
use crate::backend::MultipartUpload;
use crate::backend::ObjectStore;
use crate::backend::ObjectStoreError;
use crate::backend::SseKey;
use crate::backend::VersioningState;
use crate::codec::AttributeMap;

/// Items of one attribute domain.
type Domain = BTreeMap<String, AttributeMap>;

/// In-memory attribute store.
#[derive(Default)]
pub struct MemoryAttributeStore {
    /// Domains by name.
    domains: Mutex<HashMap<String, Domain>>,
}

impl MemoryAttributeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the domain map, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Domain>> {
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks an expected-value precondition against an item.
    fn check_condition(
        item_name: &str,
        item: Option<&AttributeMap>,
        expected_name: &str,
        expected: &ExpectedValue,
    ) -> Result<(), AttributeStoreError> {
        let current = item.and_then(|attributes| attributes.get(expected_name));
        let holds = match expected {
            ExpectedValue::Absent => current.is_none(),
            ExpectedValue::Is(value) => current == Some(value),
        };
        if holds {
            Ok(())
        } else {
            Err(AttributeStoreError::ConditionFailed {
                item: item_name.to_string(),
            })
        }
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn create_domain(&self, domain: &str) -> Result<(), AttributeStoreError> {
        self.lock().entry(domain.to_string()).or_default();
        Ok(())
    }

    fn delete_domain(&self, domain: &str) -> Result<(), AttributeStoreError> {
        self.lock()
            .remove(domain)
            .map(|_| ())
            .ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))
    }

    fn domain_exists(&self, domain: &str) -> Result<bool, AttributeStoreError> {
        Ok(self.lock().contains_key(domain))
    }

    fn get_attributes(&self, domain: &str, item: &str) -> Result<AttributeMap, AttributeStoreError> {
        let domains = self.lock();
        let items =
            domains.get(domain).ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        Ok(items.get(item).cloned().unwrap_or_default())
    }

    fn put_attributes(
        &self,
        domain: &str,
        item: &str,
        attributes: &AttributeMap,
    ) -> Result<(), AttributeStoreError> {
        let mut domains = self.lock();
        let items = domains
            .get_mut(domain)
            .ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        let entry = items.entry(item.to_string()).or_default();
        for (name, value) in attributes {
            entry.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn put_attributes_conditional(
        &self,
        domain: &str,
        item: &str,
        attributes: &AttributeMap,
        expected_name: &str,
        expected: &ExpectedValue,
    ) -> Result<(), AttributeStoreError> {
        let mut domains = self.lock();
        let items = domains
            .get_mut(domain)
            .ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        Self::check_condition(item, items.get(item), expected_name, expected)?;
        let entry = items.entry(item.to_string()).or_default();
        for (name, value) in attributes {
            entry.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn batch_put_attributes(
        &self,
        domain: &str,
        items: &[(String, AttributeMap)],
    ) -> Result<(), AttributeStoreError> {
        for (item, attributes) in items {
            self.put_attributes(domain, item, attributes)?;
        }
        Ok(())
    }

    fn delete_item(&self, domain: &str, item: &str) -> Result<(), AttributeStoreError> {
        let mut domains = self.lock();
        let items = domains
            .get_mut(domain)
            .ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        items.remove(item);
        Ok(())
    }

    fn delete_item_conditional(
        &self,
        domain: &str,
        item: &str,
        expected_name: &str,
        expected: &ExpectedValue,
    ) -> Result<(), AttributeStoreError> {
        let mut domains = self.lock();
        let items = domains
            .get_mut(domain)
            .ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        Self::check_condition(item, items.get(item), expected_name, expected)?;
        items.remove(item);
        Ok(())
    }

    fn delete_attributes(
        &self,
        domain: &str,
        item: &str,
        names: &[String],
    ) -> Result<(), AttributeStoreError> {
        let mut domains = self.lock();
        let items = domains
            .get_mut(domain)
            .ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        if let Some(attributes) = items.get_mut(item) {
            for name in names {
                attributes.remove(name);
            }
        }
        Ok(())
    }

    fn batch_delete_items(
        &self,
        domain: &str,
        items: &[String],
    ) -> Result<(), AttributeStoreError> {
        for item in items {
            self.delete_item(domain, item)?;
        }
        Ok(())
    }

    fn list_items(
        &self,
        domain: &str,
    ) -> Result<Vec<(String, AttributeMap)>, AttributeStoreError> {
        let domains = self.lock();
        let items =
            domains.get(domain).ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        Ok(items.iter().map(|(name, attributes)| (name.clone(), attributes.clone())).collect())
    }

    fn query_by_attribute(
        &self,
        domain: &str,
        name: &str,
        value: &str,
    ) -> Result<Vec<(String, AttributeMap)>, AttributeStoreError> {
        let domains = self.lock();
        let items =
            domains.get(domain).ok_or_else(|| AttributeStoreError::NoSuchDomain(domain.to_string()))?;
        Ok(items
            .iter()
            .filter(|(_, attributes)| attributes.get(name).map(String::as_str) == Some(value))
            .map(|(item, attributes)| (item.clone(), attributes.clone()))
            .collect())
    }
}

/// Versions of one object key, in insertion order.
type Versions = BTreeMap<String, Vec<u8>>;

/// One in-memory bucket.
#[derive(Default)]
struct Bucket {
    /// Region the bucket was created in.
    region: String,
    /// Observed versioning state.
    versioning: VersioningState,
    /// Object versions by key.
    objects: HashMap<String, Versions>,
    /// Part sizes recorded per `(key, version)` multipart upload.
    part_sizes: HashMap<(String, String), Vec<usize>>,
    /// Number of multipart uploads started but not finished.
    open_uploads: usize,
    /// Monotonic version counter.
    next_version: u64,
}

/// Shared mutable state of the in-memory object store.
#[derive(Default)]
struct ObjectState {
    /// Buckets by name.
    buckets: HashMap<String, Bucket>,
}

/// In-memory versioned object store.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    /// Shared state, also held by open multipart handles.
    state: Arc<Mutex<ObjectState>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flips one byte of a stored object version.
    ///
    /// Test hook for exercising checksum verification failures.
    pub fn corrupt_version(&self, bucket: &str, key: &str, version: &str) {
        let mut state = self.lock();
        if let Some(bytes) = state
            .buckets
            .get_mut(bucket)
            .and_then(|b| b.objects.get_mut(key))
            .and_then(|versions| versions.get_mut(version))
            && let Some(first) = bytes.first_mut()
        {
            *first ^= 0xFF;
        }
    }

    /// Returns the part sizes of the multipart upload that produced a
    /// version, or `None` when the version was written in a single call.
    #[must_use]
    pub fn part_sizes(&self, bucket: &str, key: &str, version: &str) -> Option<Vec<usize>> {
        let state = self.lock();
        state
            .buckets
            .get(bucket)?
            .part_sizes
            .get(&(key.to_string(), version.to_string()))
            .cloned()
    }

    /// Number of multipart uploads started but never completed or aborted.
    #[must_use]
    pub fn open_upload_count(&self, bucket: &str) -> usize {
        let state = self.lock();
        state.buckets.get(bucket).map_or(0, |b| b.open_uploads)
    }
}

/// Looks up a bucket or reports it missing.
fn bucket_mut<'a>(
    state: &'a mut ObjectState,
    bucket: &str,
) -> Result<&'a mut Bucket, ObjectStoreError> {
    state
        .buckets
        .get_mut(bucket)
        .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))
}

/// Allocates the next version id of a bucket.
fn allocate_version(bucket: &mut Bucket) -> String {
    bucket.next_version += 1;
    format!("v{}", bucket.next_version)
}

impl ObjectStore for MemoryObjectStore {
    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ObjectStoreError> {
        let mut state = self.lock();
        state.buckets.entry(bucket.to_string()).or_insert_with(|| Bucket {
            region: region.to_string(),
            ..Bucket::default()
        });
        Ok(())
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.lock().buckets.contains_key(bucket))
    }

    fn bucket_location(&self, bucket: &str) -> Result<String, ObjectStoreError> {
        let state = self.lock();
        state
            .buckets
            .get(bucket)
            .map(|b| b.region.clone())
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))
    }

    fn delete_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        let mut state = self.lock();
        let entry = bucket_mut(&mut state, bucket)?;
        if !entry.objects.is_empty() {
            return Err(ObjectStoreError::Service(format!("bucket '{bucket}' is not empty")));
        }
        state.buckets.remove(bucket);
        Ok(())
    }

    fn purge_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        let mut state = self.lock();
        let entry = bucket_mut(&mut state, bucket)?;
        entry.objects.clear();
        entry.part_sizes.clear();
        entry.open_uploads = 0;
        Ok(())
    }

    fn enable_versioning(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        let mut state = self.lock();
        bucket_mut(&mut state, bucket)?.versioning = VersioningState::Enabled;
        Ok(())
    }

    fn versioning_state(&self, bucket: &str) -> Result<VersioningState, ObjectStoreError> {
        let state = self.lock();
        state
            .buckets
            .get(bucket)
            .map(|b| b.versioning)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        _sse: Option<&SseKey>,
    ) -> Result<String, ObjectStoreError> {
        let mut state = self.lock();
        let entry = bucket_mut(&mut state, bucket)?;
        let version = allocate_version(entry);
        entry.objects.entry(key.to_string()).or_default().insert(version.clone(), body.to_vec());
        Ok(version)
    }

    fn start_multipart(
        &self,
        bucket: &str,
        key: &str,
        _sse: Option<&SseKey>,
    ) -> Result<Box<dyn MultipartUpload>, ObjectStoreError> {
        let mut state = self.lock();
        bucket_mut(&mut state, bucket)?.open_uploads += 1;
        Ok(Box::new(MemoryMultipartUpload {
            state: Arc::clone(&self.state),
            bucket: bucket.to_string(),
            key: key.to_string(),
            parts: Vec::new(),
        }))
    }

    fn read_object(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
        _sse: Option<&SseKey>,
        writable: &mut dyn Write,
    ) -> Result<u64, ObjectStoreError> {
        let body = {
            let state = self.lock();
            state
                .buckets
                .get(bucket)
                .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))?
                .objects
                .get(key)
                .and_then(|versions| versions.get(version))
                .ok_or_else(|| ObjectStoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?
                .clone()
        };
        writable.write_all(&body)?;
        Ok(body.len() as u64)
    }

    fn object_size(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
    ) -> Result<u64, ObjectStoreError> {
        let state = self.lock();
        state
            .buckets
            .get(bucket)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))?
            .objects
            .get(key)
            .and_then(|versions| versions.get(version))
            .map(|body| body.len() as u64)
            .ok_or_else(|| ObjectStoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn delete_version(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
    ) -> Result<(), ObjectStoreError> {
        let mut state = self.lock();
        let entry = bucket_mut(&mut state, bucket)?;
        if let Some(versions) = entry.objects.get_mut(key) {
            versions.remove(version);
            if versions.is_empty() {
                entry.objects.remove(key);
            }
        }
        Ok(())
    }
}

/// In-memory multipart upload handle.
struct MemoryMultipartUpload {
    /// Shared store state.
    state: Arc<Mutex<ObjectState>>,
    /// Target bucket.
    bucket: String,
    /// Target key.
    key: String,
    /// Parts uploaded so far.
    parts: Vec<Vec<u8>>,
}

impl MemoryMultipartUpload {
    /// Locks the shared state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MultipartUpload for MemoryMultipartUpload {
    fn upload_part(&mut self, body: &[u8]) -> Result<(), ObjectStoreError> {
        self.parts.push(body.to_vec());
        Ok(())
    }

    fn complete(self: Box<Self>) -> Result<String, ObjectStoreError> {
        let mut state = self.lock();
        let entry = bucket_mut(&mut state, &self.bucket)?;
        entry.open_uploads = entry.open_uploads.saturating_sub(1);
        let version = allocate_version(entry);
        let sizes: Vec<usize> = self.parts.iter().map(Vec::len).collect();
        let body: Vec<u8> = self.parts.concat();
        entry.objects.entry(self.key.clone()).or_default().insert(version.clone(), body);
        entry.part_sizes.insert((self.key.clone(), version.clone()), sizes);
        Ok(version)
    }

    fn abort(self: Box<Self>) -> Result<(), ObjectStoreError> {
        let mut state = self.lock();
        let entry = bucket_mut(&mut state, &self.bucket)?;
        entry.open_uploads = entry.open_uploads.saturating_sub(1);
        Ok(())
    }
}
