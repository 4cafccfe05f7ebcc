// crates/moorage-core/tests/store_lifecycle.rs
// ============================================================================
// Module: Store Lifecycle Tests
// Description: Registry protocol, binding checks and destroy semantics.
// Purpose: Validate initialize/resume/destroy across store instances.
// ============================================================================

//! ## Overview
//! Exercises the tri-state registry protocol and the resource binding
//! conflicts over shared in-memory backends.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::io::Write;

use moorage_core::JobDescriptor;
use moorage_core::JobStore;
use moorage_core::JobStoreError;
use moorage_core::Locator;
use moorage_core::backend::ObjectStore;

use common::TestBackends;
use common::initialize_store;
use common::test_config;
use common::test_locator;

#[test]
fn initialize_twice_reports_an_existing_store() {
    let backends = TestBackends::new();
    let _store = initialize_store(&backends, test_config(1024, 256));

    let result = JobStore::initialize(test_locator(), test_config(1024, 256), backends.clients());
    assert!(matches!(result, Err(JobStoreError::JobStoreExists(_))));
}

#[test]
fn resume_requires_a_registered_store() {
    let backends = TestBackends::new();
    let result = JobStore::resume(test_locator(), test_config(1024, 256), backends.clients());
    assert!(matches!(result, Err(JobStoreError::NoSuchJobStore(_))));
}

#[test]
fn resume_binds_an_initialized_store() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));
    let job = JobDescriptor::new("persisted");
    store.create_job(&job).expect("create");

    let resumed =
        JobStore::resume(test_locator(), test_config(1024, 256), backends.clients()).expect("resume");
    let loaded = resumed.load_job(job.id).expect("load");
    assert_eq!(loaded, job);
}

#[test]
fn destroy_then_initialize_yields_a_fresh_store() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let job = JobDescriptor::new("doomed");
    store.create_job(&job).expect("create");
    let file_id = store
        .write_file_stream(Some(job.id), |writer| {
            writer.write_all(b"doomed content")?;
            Ok(())
        })
        .expect("write file");

    store.destroy().expect("destroy");

    let resumed = JobStore::resume(test_locator(), test_config(1024, 256), backends.clients());
    assert!(matches!(resumed, Err(JobStoreError::NoSuchJobStore(_))));

    let fresh = initialize_store(&backends, test_config(1024, 256));
    assert!(fresh.jobs().expect("jobs").is_empty());
    assert!(!fresh.file_exists(file_id).expect("file exists"));
}

#[test]
fn destroy_is_idempotent_about_missing_resources() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    // Someone else already ripped the bucket out from under the store.
    backends.object_store.purge_bucket("it-store--files").expect("purge");
    backends.object_store.delete_bucket("it-store--files").expect("delete bucket");

    store.destroy().expect("destroy tolerates missing resources");
}

#[test]
fn resume_in_a_conflicting_region_is_fatal() {
    let backends = TestBackends::new();
    let _store = initialize_store(&backends, test_config(1024, 256));

    let elsewhere = Locator::parse("eu-central-1:it-store").expect("locator");
    let result = JobStore::resume(elsewhere, test_config(1024, 256), backends.clients());
    assert!(matches!(result, Err(JobStoreError::LocationConflict { .. })));
}

#[test]
fn resume_of_an_unversioned_bucket_is_fatal() {
    let backends = TestBackends::new();
    let _store = initialize_store(&backends, test_config(1024, 256));

    // Simulate a bucket that lost its versioning configuration: rebuild it
    // without enabling versioning.
    backends.object_store.purge_bucket("it-store--files").expect("purge");
    backends.object_store.delete_bucket("it-store--files").expect("delete bucket");
    backends.object_store.create_bucket("it-store--files", "us-west-2").expect("recreate");

    let result = JobStore::resume(test_locator(), test_config(1024, 256), backends.clients());
    assert!(matches!(result, Err(JobStoreError::VersioningConflict { .. })));
}

#[test]
fn stores_with_different_prefixes_are_independent() {
    let backends = TestBackends::new();
    let first = initialize_store(&backends, test_config(1024, 256));
    let second = JobStore::initialize(
        Locator::parse("us-west-2:other-store").expect("locator"),
        test_config(1024, 256),
        backends.clients(),
    )
    .expect("initialize");

    let job = JobDescriptor::new("mine");
    first.create_job(&job).expect("create");
    assert!(second.jobs().expect("jobs").is_empty());
    assert!(matches!(second.load_job(job.id), Err(JobStoreError::NoSuchJob(_))));
}
