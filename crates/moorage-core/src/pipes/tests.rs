// crates/moorage-core/src/pipes/tests.rs
// ============================================================================
// Module: Transfer Pipe Unit Tests
// Description: Tests for pipe teardown semantics and the verifying reader.
// Purpose: Validate EOF/abort disambiguation and error precedence.
// ============================================================================

#![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

use std::io;
use std::io::Read;
use std::io::Write;
use std::rc::Rc;

use super::VerifyingReader;
use super::read_full;
use super::run_readable;
use super::run_writable;
use crate::checksum::ChecksumError;
use crate::checksum::RollingChecksum;
use crate::error::JobStoreError;

/// Payload larger than one channel block.
fn large_payload() -> Vec<u8> {
    (0 .. 200_000u32).map(|i| u8::try_from(i % 251).expect("fits")).collect()
}

#[test]
fn upload_pipe_round_trips_all_bytes() {
    let payload = large_payload();
    let received: Vec<u8> = run_writable::<_, JobStoreError, _, _>(
        |mut reader| {
            let mut collected = Vec::new();
            reader.read_to_end(&mut collected)?;
            Ok(collected)
        },
        |writer| {
            writer.write_all(&payload)?;
            Ok(())
        },
    )
    .expect("transfer");
    assert_eq!(received, payload);
}

#[test]
fn producer_abort_reaches_the_worker_as_unexpected_eof() {
    let result = run_writable::<Vec<u8>, JobStoreError, _, _>(
        |mut reader| {
            let mut collected = Vec::new();
            let err = reader.read_to_end(&mut collected).expect_err("producer aborted");
            assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
            Err(err.into())
        },
        |writer| {
            writer.write_all(b"partial")?;
            Err(JobStoreError::NoSuchJob("simulated producer failure".to_string()))
        },
    );
    // The producer's own error is the root cause and wins.
    assert!(matches!(result, Err(JobStoreError::NoSuchJob(_))));
}

#[test]
fn worker_failure_wins_when_producer_only_hit_broken_pipe() {
    let payload = large_payload();
    let result = run_writable::<(), JobStoreError, _, _>(
        |reader| {
            drop(reader);
            Err(JobStoreError::NoSuchFile("simulated worker failure".to_string()))
        },
        |writer| {
            // Keep writing until the vanished worker surfaces as BrokenPipe.
            loop {
                writer.write_all(&payload)?;
            }
        },
    );
    assert!(matches!(result, Err(JobStoreError::NoSuchFile(_))));
}

#[test]
fn download_pipe_round_trips_all_bytes() {
    let payload = large_payload();
    let received: Vec<u8> = run_readable::<_, JobStoreError, _, _>(
        |mut writer| {
            writer.write_all(&payload)?;
            writer.finish()?;
            Ok(())
        },
        |reader| {
            let mut collected = Vec::new();
            reader.read_to_end(&mut collected)?;
            Ok(collected)
        },
    )
    .expect("transfer");
    assert_eq!(received, payload);
}

#[test]
fn early_consumer_stop_is_graceful_when_worker_tolerates_broken_pipe() {
    let payload = large_payload();
    let received: Vec<u8> = run_readable::<_, JobStoreError, _, _>(
        |mut writer| {
            let outcome = writer.write_all(&payload).and_then(|()| writer.finish());
            match outcome {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                Err(err) => Err(err.into()),
            }
        },
        |reader| {
            let mut first = vec![0u8; 1024];
            let count = read_full(reader, &mut first)?;
            first.truncate(count);
            Ok(first)
        },
    )
    .expect("partial read");
    assert_eq!(received, payload[.. 1024]);
}

#[test]
fn download_pipe_consumer_may_return_a_thread_local_value() {
    // The consumer runs on the calling thread, so its result does not have
    // to be sendable across threads.
    let received: Rc<Vec<u8>> = run_readable::<_, JobStoreError, _, _>(
        |mut writer| {
            writer.write_all(b"local")?;
            writer.finish()?;
            Ok(())
        },
        |reader| {
            let mut collected = Vec::new();
            reader.read_to_end(&mut collected)?;
            Ok(Rc::new(collected))
        },
    )
    .expect("transfer");
    assert_eq!(received.as_slice(), b"local");
}

#[test]
fn worker_abort_wins_over_the_consumer_eof_error() {
    let result = run_readable::<Vec<u8>, JobStoreError, _, _>(
        |writer| {
            drop(writer);
            Err(JobStoreError::NoSuchFile("simulated download failure".to_string()))
        },
        |reader| {
            let mut collected = Vec::new();
            reader.read_to_end(&mut collected)?;
            Ok(collected)
        },
    );
    assert!(matches!(result, Err(JobStoreError::NoSuchFile(_))));
}

#[test]
fn read_full_is_short_only_at_end_of_stream() {
    let mut source: &[u8] = b"0123456789";
    let mut buf = [0u8; 4];
    assert_eq!(read_full(&mut source, &mut buf).expect("read"), 4);
    assert_eq!(&buf, b"0123");
    let mut buf = [0u8; 16];
    assert_eq!(read_full(&mut source, &mut buf).expect("read"), 6);
    assert_eq!(&buf[.. 6], b"456789");
    assert_eq!(read_full(&mut source, &mut buf).expect("read"), 0);
}

#[test]
fn verifying_reader_accepts_a_matching_stream() {
    let mut rolling = RollingChecksum::new();
    rolling.update(b"content");
    let stored = rolling.finish().expect("finish");

    let source: &[u8] = b"content";
    let mut reader = VerifyingReader::new(source, Some(&stored)).expect("reader");
    let mut collected = Vec::new();
    reader.read_to_end(&mut collected).expect("read");
    assert!(reader.verify().is_ok());
}

#[test]
fn verifying_reader_rejects_a_tampered_stream() {
    let mut rolling = RollingChecksum::new();
    rolling.update(b"content");
    let stored = rolling.finish().expect("finish");

    let source: &[u8] = b"tampered";
    let mut reader = VerifyingReader::new(source, Some(&stored)).expect("reader");
    let mut collected = Vec::new();
    reader.read_to_end(&mut collected).expect("read");
    assert!(matches!(reader.verify(), Err(ChecksumError::Mismatch { .. })));
}

#[test]
fn verifying_reader_skips_partial_reads() {
    let mut rolling = RollingChecksum::new();
    rolling.update(b"content");
    let stored = rolling.finish().expect("finish");

    let source: &[u8] = b"tampered";
    let mut reader = VerifyingReader::new(source, Some(&stored)).expect("reader");
    let mut buf = [0u8; 4];
    read_full(&mut reader, &mut buf).expect("read");
    // The stream was never drained, so no verdict is possible.
    assert!(reader.verify().is_ok());
}
