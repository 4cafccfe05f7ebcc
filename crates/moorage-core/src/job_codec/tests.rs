// crates/moorage-core/src/job_codec/tests.rs
// ============================================================================
// Module: Job Record Codec Unit Tests
// Description: Inline and overlarge round-trip tests for job items.
// Purpose: Validate the overflow fallback and schema guards.
// ============================================================================

#![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

use std::sync::Arc;
use std::time::Duration;

use super::OVERLARGE_ID_ATTRIBUTE;
use super::job_from_item;
use super::job_to_item;
use crate::backend::AttributeStore;
use crate::backend::ObjectStore;
use crate::codec;
use crate::codec::AttributeMap;
use crate::config::StoreConfig;
use crate::context::StoreContext;
use crate::error::JobStoreError;
use crate::file_record::FileRecord;
use crate::job::JobDescriptor;
use crate::memory::MemoryAttributeStore;
use crate::memory::MemoryObjectStore;
use crate::retry::FixedBackoff;

/// Builds a bound context over fresh in-memory backends.
fn test_context() -> Arc<StoreContext> {
    let attribute_store = Arc::new(MemoryAttributeStore::new());
    let object_store = Arc::new(MemoryObjectStore::new());
    attribute_store.create_domain("test--files").expect("create domain");
    object_store.create_bucket("test--files", "us-west-2").expect("create bucket");
    Arc::new(StoreContext {
        attribute_store,
        object_store,
        retry: Arc::new(FixedBackoff::new(Duration::ZERO, 3)),
        cipher: None,
        sse_key: None,
        config: StoreConfig::default(),
        files_domain: "test--files".to_string(),
        bucket: "test--files".to_string(),
    })
}

/// Builds a descriptor whose serialized form exceeds the inline budget.
fn overlarge_job() -> JobDescriptor {
    let mut job = JobDescriptor::new("giant");
    let filler = "x".repeat(1024);
    for index in 0 .. 250 {
        job.environment.insert(format!("VARIABLE_{index}"), filler.clone());
    }
    job
}

#[test]
fn small_job_is_stored_inline() {
    let context = test_context();
    let job = JobDescriptor::new("small");
    let item = job_to_item(&context, &job).expect("encode");
    assert_eq!(item.get(OVERLARGE_ID_ATTRIBUTE).map(String::as_str), Some(""));
    assert!(item.contains_key(codec::NUM_CHUNKS_ATTRIBUTE));

    let decoded = job_from_item(&context, &item).expect("decode");
    assert_eq!(decoded, job);
}

#[test]
fn overlarge_job_spills_into_a_file_record() {
    let context = test_context();
    let job = overlarge_job();
    assert!(serde_json::to_vec(&job).expect("serialize").len() > codec::max_binary_size(1));

    let item = job_to_item(&context, &job).expect("encode");
    let marker = item.get(OVERLARGE_ID_ATTRIBUTE).expect("marker");
    assert!(!marker.is_empty());

    let decoded = job_from_item(&context, &item).expect("decode");
    assert_eq!(decoded, job);
}

#[test]
fn overlarge_round_trip_is_idempotent() {
    let context = test_context();
    let job = overlarge_job();
    let item = job_to_item(&context, &job).expect("encode");
    let once = job_from_item(&context, &item).expect("decode");
    let item_again = job_to_item(&context, &once).expect("re-encode");
    let twice = job_from_item(&context, &item_again).expect("re-decode");
    assert_eq!(twice, job);
}

#[test]
fn overflow_file_is_owned_by_the_job() {
    let context = test_context();
    let job = overlarge_job();
    let item = job_to_item(&context, &job).expect("encode");
    let file_id = super::overlarge_file_id(&item).expect("file id");
    let record = FileRecord::load_or_fail(Arc::clone(&context), file_id).expect("load");
    assert_eq!(record.owner_id(), job.id.to_string());
}

#[test]
fn missing_overlarge_marker_is_an_incompatible_schema() {
    let context = test_context();
    let job = JobDescriptor::new("small");
    let mut item = job_to_item(&context, &job).expect("encode");
    item.remove(OVERLARGE_ID_ATTRIBUTE);
    let result = job_from_item(&context, &item);
    assert!(matches!(result, Err(JobStoreError::IncompatibleSchema(_))));
}

#[test]
fn malformed_overlarge_marker_is_an_incompatible_schema() {
    let context = test_context();
    let mut item = AttributeMap::new();
    item.insert(OVERLARGE_ID_ATTRIBUTE.to_string(), "not-a-uuid".to_string());
    let result = job_from_item(&context, &item);
    assert!(matches!(result, Err(JobStoreError::IncompatibleSchema(_))));
}
