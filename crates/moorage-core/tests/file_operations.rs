// crates/moorage-core/tests/file_operations.rs
// ============================================================================
// Module: File Operation Tests
// Description: File content, shared files and the stats drain.
// Purpose: Validate the file surface of a bound store end to end.
// ============================================================================

//! ## Overview
//! Exercises file write/read/update/delete, the named shared-file surface,
//! the stats queue and the transfer placement rules visible through the
//! in-memory object store.

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

use moorage_core::FileId;
use moorage_core::JobStoreError;

use common::TestBackends;
use common::initialize_store;
use common::test_config;

const FILES_BUCKET: &str = "it-store--files";

/// Writes `payload` as an anonymous file and returns its id.
fn write_bytes(store: &moorage_core::JobStore, payload: &[u8]) -> FileId {
    store
        .write_file_stream(None, |writer| {
            writer.write_all(payload)?;
            Ok(())
        })
        .expect("write file")
}

/// Reads a file's full content through the streaming surface.
fn read_bytes(store: &moorage_core::JobStore, file_id: FileId) -> Vec<u8> {
    store
        .read_file_stream(file_id, |reader| {
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            Ok(content)
        })
        .expect("read file")
}

#[test]
fn file_write_update_delete_round_trips() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let file_id = write_bytes(&store, b"first draft");
    assert!(store.file_exists(file_id).expect("exists"));
    assert_eq!(read_bytes(&store, file_id), b"first draft");
    assert_eq!(store.file_size(file_id).expect("size"), 11);

    store
        .update_file_stream(file_id, |writer| {
            writer.write_all(b"second draft, longer")?;
            Ok(())
        })
        .expect("update");
    assert_eq!(read_bytes(&store, file_id), b"second draft, longer");

    store.delete_file(file_id).expect("delete");
    assert!(!store.file_exists(file_id).expect("exists"));
    assert!(matches!(store.file_size(file_id), Err(JobStoreError::NoSuchFile(_))));

    // Deleting again is a no-op.
    store.delete_file(file_id).expect("repeat delete");
}

#[test]
fn files_round_trip_through_local_paths() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(64, 16));
    let workspace = tempfile::tempdir().expect("tempdir");

    let source = workspace.path().join("source.bin");
    let payload = vec![0x5Au8; 500];
    std::fs::write(&source, &payload).expect("write source");

    let file_id = store.write_file(&source, None).expect("write");
    assert_eq!(store.file_size(file_id).expect("size"), 500);

    let target = workspace.path().join("target.bin");
    store.read_file(file_id, &target).expect("read");
    assert_eq!(std::fs::read(&target).expect("read target"), payload);

    let replacement = workspace.path().join("replacement.bin");
    std::fs::write(&replacement, b"short now").expect("write replacement");
    store.update_file(file_id, &replacement).expect("update");
    assert_eq!(read_bytes(&store, file_id), b"short now");
}

#[test]
fn empty_files_exist_with_zero_size() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let file_id = store.empty_file(None).expect("empty file");
    assert!(store.file_exists(file_id).expect("exists"));
    assert_eq!(store.file_size(file_id).expect("size"), 0);
    assert!(read_bytes(&store, file_id).is_empty());
}

#[test]
fn large_streams_upload_in_parts() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(64, 32));

    let payload: Vec<u8> = (0 .. 200u16).map(|value| u8::try_from(value % 251).expect("fits")).collect();
    let file_id = write_bytes(&store, &payload);
    assert_eq!(read_bytes(&store, file_id), payload);

    let parts = backends
        .object_store
        .part_sizes(FILES_BUCKET, &file_id.to_string(), "v1")
        .expect("multipart upload recorded");
    assert_eq!(parts, vec![64, 64, 64, 8]);
    assert_eq!(backends.object_store.open_upload_count(FILES_BUCKET), 0);
}

#[test]
fn corrupted_content_is_reported_on_read() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 16));

    let payload = vec![0xC3u8; 400];
    let file_id = write_bytes(&store, &payload);
    backends.object_store.corrupt_version(FILES_BUCKET, &file_id.to_string(), "v1");

    let result = store.read_file_stream(file_id, |reader| {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        Ok(content)
    });
    assert!(matches!(result, Err(JobStoreError::Checksum(_))));
}

#[test]
fn shared_files_round_trip_and_overwrite() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    store
        .write_shared_file_stream("config.json", |writer| {
            writer.write_all(b"{\"tries\": 3}")?;
            Ok(())
        })
        .expect("write shared");
    let content = store
        .read_shared_file_stream("config.json", |reader| {
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            Ok(content)
        })
        .expect("read shared");
    assert_eq!(content, b"{\"tries\": 3}");

    store
        .write_shared_file_stream("config.json", |writer| {
            writer.write_all(b"{\"tries\": 9}")?;
            Ok(())
        })
        .expect("overwrite shared");
    let content = store
        .read_shared_file_stream("config.json", |reader| {
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            Ok(content)
        })
        .expect("reread shared");
    assert_eq!(content, b"{\"tries\": 9}");
}

#[test]
fn shared_file_names_are_validated() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let result = store.write_shared_file_stream("no spaces allowed", |_| Ok(()));
    assert!(matches!(result, Err(JobStoreError::InvalidSharedFileName(_))));

    let result = store.read_shared_file_stream("", |_| Ok(()));
    assert!(matches!(result, Err(JobStoreError::InvalidSharedFileName(_))));
}

#[test]
fn reading_an_unwritten_shared_file_fails() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    let result = store.read_shared_file_stream("never-written", |_| Ok(()));
    assert!(matches!(result, Err(JobStoreError::NoSuchFile(_))));
}

#[test]
fn stats_are_drained_once_unless_replayed() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    store.write_stats(b"{\"clock\": 1}").expect("write stats");
    store.write_stats(b"{\"clock\": 2}").expect("write stats");

    let mut seen = Vec::new();
    let drained = store
        .read_stats(
            |payload| {
                seen.push(payload.to_vec());
                Ok(())
            },
            false,
        )
        .expect("read stats");
    assert_eq!(drained, 2);
    seen.sort();
    assert_eq!(seen, vec![b"{\"clock\": 1}".to_vec(), b"{\"clock\": 2}".to_vec()]);

    // The pending queue is now empty.
    let drained = store.read_stats(|_| Ok(()), false).expect("read stats");
    assert_eq!(drained, 0);

    // A replay revisits already-read entries.
    let drained = store.read_stats(|_| Ok(()), true).expect("replay stats");
    assert_eq!(drained, 2);
}

#[test]
fn new_stats_arrive_while_old_ones_stay_read() {
    let backends = TestBackends::new();
    let store = initialize_store(&backends, test_config(1024, 256));

    store.write_stats(b"old").expect("write stats");
    assert_eq!(store.read_stats(|_| Ok(()), false).expect("read"), 1);

    store.write_stats(b"new").expect("write stats");
    let mut seen = Vec::new();
    let drained = store
        .read_stats(
            |payload| {
                seen.push(payload.to_vec());
                Ok(())
            },
            false,
        )
        .expect("read");
    assert_eq!(drained, 1);
    assert_eq!(seen, vec![b"new".to_vec()]);
}
