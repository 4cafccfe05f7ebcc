// crates/moorage-core/src/job_codec.rs
// ============================================================================
// Module: Job Record Codec
// Description: Job descriptor (de)serialization into attribute items.
// Purpose: Inline small jobs; spill oversized jobs into file records.
// Dependencies: serde_json, tracing
// ============================================================================

//! ## Overview
//! A job descriptor is serialized to JSON and chunk-encoded straight into
//! its item when it fits the chunk budget, reserving one extra attribute
//! for the `overlargeID` marker. A descriptor too large for its item is
//! instead streamed into a fresh file record owned by the job, and the
//! item stores only that file's id under `overlargeID`. An item without
//! the marker at all predates this schema and is rejected as incompatible.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::codec;
use crate::codec::AttributeMap;
use crate::context::StoreContext;
use crate::error::JobStoreError;
use crate::file_record::FileId;
use crate::file_record::FileRecord;
use crate::job::JobDescriptor;

/// Attribute pointing at the overflow file; empty means the job is inline.
pub const OVERLARGE_ID_ATTRIBUTE: &str = "overlargeID";

/// Serializes a job descriptor into its item attributes.
///
/// Descriptors within `max_binary_size(1)` are chunked inline; larger ones
/// are written through a file record owned by the job and referenced via
/// [`OVERLARGE_ID_ATTRIBUTE`].
///
/// # Errors
///
/// Returns [`JobStoreError`] when serialization or the overflow upload
/// fails.
pub fn job_to_item(
    context: &Arc<StoreContext>,
    job: &JobDescriptor,
) -> Result<AttributeMap, JobStoreError> {
    let blob = serde_json::to_vec(job)?;
    if blob.len() <= codec::max_binary_size(1) {
        let (mut attributes, _) = codec::binary_to_attributes(Some(&blob))?;
        attributes.insert(OVERLARGE_ID_ATTRIBUTE.to_string(), String::new());
        return Ok(attributes);
    }
    debug!(job_id = %job.id, size = blob.len(), "job descriptor is overlarge, spilling to a file");
    let mut record = FileRecord::create(Arc::clone(context), &job.id.to_string());
    record.upload_stream(|writer| {
        writer.write_all(&blob)?;
        Ok(())
    })?;
    record.save()?;
    let (mut attributes, _) = codec::binary_to_attributes(None)?;
    attributes.insert(OVERLARGE_ID_ATTRIBUTE.to_string(), record.file_id().to_string());
    Ok(attributes)
}

/// Reconstructs a job descriptor from its item attributes.
///
/// # Errors
///
/// Returns [`JobStoreError::IncompatibleSchema`] when the overlarge marker
/// is missing or malformed, and [`JobStoreError`] when the overflow file
/// cannot be read.
pub fn job_from_item(
    context: &Arc<StoreContext>,
    item: &AttributeMap,
) -> Result<JobDescriptor, JobStoreError> {
    let overlarge_id = item.get(OVERLARGE_ID_ATTRIBUTE).ok_or_else(|| {
        JobStoreError::IncompatibleSchema(
            "job item has no overlarge marker; the store was created by an \
             incompatible version"
                .to_string(),
        )
    })?;
    let blob = if overlarge_id.is_empty() {
        let (payload, _) = codec::attributes_to_binary(item)?;
        payload.ok_or_else(|| {
            JobStoreError::IncompatibleSchema("inline job item carries no content".to_string())
        })?
    } else {
        let file_id = FileId::parse(overlarge_id).map_err(|err| {
            JobStoreError::IncompatibleSchema(format!(
                "overlarge marker '{overlarge_id}' is not a file id: {err}"
            ))
        })?;
        let record = FileRecord::load_or_fail(Arc::clone(context), file_id)?;
        record.download_stream(context.config.verify_checksums, |reader| {
            let mut collected = Vec::new();
            reader.read_to_end(&mut collected)?;
            Ok(collected)
        })?
    };
    Ok(serde_json::from_slice(&blob)?)
}

/// Returns the overflow file id referenced by a job item, if any.
pub(crate) fn overlarge_file_id(item: &AttributeMap) -> Option<FileId> {
    let overlarge_id = item.get(OVERLARGE_ID_ATTRIBUTE)?;
    if overlarge_id.is_empty() {
        return None;
    }
    FileId::parse(overlarge_id).ok()
}

#[cfg(test)]
mod tests;
