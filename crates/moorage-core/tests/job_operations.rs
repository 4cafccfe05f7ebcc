// crates/moorage-core/tests/job_operations.rs
// ============================================================================
// Module: Job Operation Tests
// Description: Job CRUD, batch writes and the overlarge fallback.
// Purpose: Validate the job surface of a bound store end to end.
// ============================================================================

//! ## Overview
//! Exercises job create/load/update/delete, the buffered batch writer and
//! the overflow path for descriptors too large to inline.

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
use moorage_core::JobId;
use moorage_core::JobStoreError;

use common::TestBackends;
use common::initialize_store;
use common::test_config;

/// Builds a descriptor whose serialized form exceeds the inline budget.
fn overlarge_job() -> JobDescriptor {
    let mut job = JobDescriptor::new("giant");
    let filler = "y".repeat(1024);
    for index in 0 .. 250 {
        job.environment.insert(format!("VARIABLE_{index}"), filler.clone());
    }
    job
}

#[test]
fn job_crud_round_trips() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let mut job = JobDescriptor::new("crud");
    job.command = Some("run --step one".to_string());
    store.create_job(&job).expect("create");
    assert!(store.job_exists(job.id).expect("exists"));
    assert_eq!(store.load_job(job.id).expect("load"), job);

    job.remaining_tries = 5;
    store.update_job(&job).expect("update");
    assert_eq!(store.load_job(job.id).expect("load").remaining_tries, 5);

    store.delete_job(job.id).expect("delete");
    assert!(!store.job_exists(job.id).expect("exists"));
    assert!(matches!(store.load_job(job.id), Err(JobStoreError::NoSuchJob(_))));
}

#[test]
fn loading_an_unknown_job_fails() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));
    let result = store.load_job(JobId::new());
    assert!(matches!(result, Err(JobStoreError::NoSuchJob(_))));
}

#[test]
fn overlarge_job_survives_store_round_trip() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let job = overlarge_job();
    store.create_job(&job).expect("create");
    let loaded = store.load_job(job.id).expect("load");
    assert_eq!(loaded, job);

    // Re-saving the reloaded descriptor must be stable as well.
    store.update_job(&loaded).expect("update");
    assert_eq!(store.load_job(job.id).expect("reload"), job);
}

#[test]
fn shrinking_an_overlarge_job_cleans_its_overflow_file() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let mut job = overlarge_job();
    store.create_job(&job).expect("create");

    job.environment.clear();
    store.update_job(&job).expect("update");
    assert_eq!(store.load_job(job.id).expect("load"), job);
}

#[test]
fn deleting_a_job_removes_its_owned_files() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(64, 32));

    let job = JobDescriptor::new("owner");
    store.create_job(&job).expect("create");

    // More files than one delete batch holds.
    let payload = vec![0xABu8; 100];
    let mut owned = Vec::new();
    for _ in 0 .. 30 {
        let file_id = store
            .write_file_stream(Some(job.id), |writer| {
                writer.write_all(&payload)?;
                Ok(())
            })
            .expect("write file");
        owned.push(file_id);
    }
    let unowned = store
        .write_file_stream(None, |writer| {
            writer.write_all(b"keep me")?;
            Ok(())
        })
        .expect("write file");

    store.delete_job(job.id).expect("delete job");
    for file_id in owned {
        assert!(!store.file_exists(file_id).expect("exists"));
    }
    assert!(store.file_exists(unowned).expect("exists"));
}

#[test]
fn jobs_scan_returns_every_descriptor() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let mut expected: Vec<JobDescriptor> = (0 .. 5)
        .map(|index| JobDescriptor::new(format!("job-{index}")))
        .collect();
    for job in &expected {
        store.create_job(job).expect("create");
    }

    let mut scanned = store.jobs().expect("scan");
    scanned.sort_by(|a, b| a.name.cmp(&b.name));
    expected.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(scanned, expected);
}

#[test]
fn batch_writes_flush_on_commit_and_on_overflow() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    // 30 jobs cross the 25-item flush threshold once before commit.
    let jobs: Vec<JobDescriptor> =
        (0 .. 30).map(|index| JobDescriptor::new(format!("batched-{index}"))).collect();
    let mut batch = store.batch();
    for job in &jobs {
        batch.put_job(job).expect("buffer");
    }
    batch.commit().expect("commit");

    for job in &jobs {
        assert_eq!(store.load_job(job.id).expect("load"), *job);
    }
}
