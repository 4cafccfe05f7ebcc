// crates/moorage-core/src/pipes.rs
// ============================================================================
// Module: Streaming Transfer Pipes
// Description: Thread-backed byte pipes between callers and transfer workers.
// Purpose: Stream uploads and downloads without buffering whole payloads.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A transfer couples the caller's thread with one worker thread over a
//! bounded channel of byte blocks. The API is closure-scoped: the worker is
//! always joined before the call returns, so a transfer can never be
//! abandoned half-way with a thread still running. On uploads the caller
//! produces bytes into a [`PipeWriter`] while the worker consumes a
//! [`PipeReader`]; downloads invert the roles.
//!
//! Channel teardown is disambiguated by a completion flag: a reader that
//! sees the channel close after [`PipeWriter::finish`] observes a clean
//! end-of-stream, while a close without it reports the producer as having
//! aborted. A writer whose peer vanished observes `BrokenPipe`, which
//! download workers treat as the consumer deliberately stopping early.

use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::SyncSender;
use std::thread;

use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::checksum::RollingChecksum;

/// Size of one channel block in bytes.
const BLOCK_SIZE: usize = 64 * 1024;

/// Number of in-flight blocks the channel buffers.
const CHANNEL_DEPTH: usize = 16;

/// Transfer pipe errors.
#[derive(Debug, Error)]
pub enum PipeError {
    /// The transfer worker thread panicked.
    #[error("transfer worker panicked")]
    WorkerPanicked,
}

/// Producing end of a transfer pipe.
///
/// Bytes are buffered into fixed-size blocks before crossing the channel.
/// Call [`PipeWriter::finish`] after the last byte; dropping the writer
/// without finishing makes the reader report an aborted producer.
pub struct PipeWriter {
    /// Sending half of the block channel; `None` once finished.
    sender: Option<SyncSender<Vec<u8>>>,
    /// Bytes accumulated towards the next block.
    buffer: Vec<u8>,
    /// Set by `finish` so the reader can tell EOF from producer abort.
    completed: Arc<AtomicBool>,
    /// Set when a send failed because the reading end is gone.
    consumer_gone: bool,
}

impl PipeWriter {
    /// Marks the stream complete and releases the channel.
    ///
    /// # Errors
    ///
    /// Returns `BrokenPipe` when the reading end is already gone.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let block = std::mem::take(&mut self.buffer);
            self.send_block(block)?;
        }
        self.completed.store(true, Ordering::SeqCst);
        self.sender = None;
        Ok(())
    }

    /// Sends one block, recording a vanished consumer.
    fn send_block(&mut self, block: Vec<u8>) -> io::Result<()> {
        let Some(sender) = &self.sender else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe already finished"));
        };
        sender.send(block).map_err(|_| {
            self.consumer_gone = true;
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe consumer stopped reading")
        })
    }

    /// Whether a write failed because the reading end vanished.
    #[must_use]
    pub const fn consumer_gone(&self) -> bool {
        self.consumer_gone
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= BLOCK_SIZE {
            let rest = self.buffer.split_off(BLOCK_SIZE);
            let block = std::mem::replace(&mut self.buffer, rest);
            self.send_block(block)?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let block = std::mem::take(&mut self.buffer);
            self.send_block(block)?;
        }
        Ok(())
    }
}

/// Consuming end of a transfer pipe.
pub struct PipeReader {
    /// Receiving half of the block channel.
    receiver: Receiver<Vec<u8>>,
    /// Block currently being drained.
    current: Vec<u8>,
    /// Read position within `current`.
    position: usize,
    /// Mirror of the writer's completion flag.
    completed: Arc<AtomicBool>,
    /// Set when the channel closed without the completion flag.
    producer_aborted: bool,
}

impl PipeReader {
    /// Whether the producing end vanished before finishing the stream.
    #[must_use]
    pub const fn producer_aborted(&self) -> bool {
        self.producer_aborted
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.position >= self.current.len() {
            match self.receiver.recv() {
                Ok(block) => {
                    self.current = block;
                    self.position = 0;
                },
                Err(_) => {
                    if self.completed.load(Ordering::SeqCst) {
                        return Ok(0);
                    }
                    self.producer_aborted = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "pipe producer stopped before completing the stream",
                    ));
                },
            }
        }
        let available = &self.current[self.position ..];
        let count = available.len().min(buf.len());
        buf[.. count].copy_from_slice(&available[.. count]);
        self.position += count;
        Ok(count)
    }
}

/// Builds a connected writer/reader pair.
fn pipe() -> (PipeWriter, PipeReader) {
    let (sender, receiver) = mpsc::sync_channel(CHANNEL_DEPTH);
    let completed = Arc::new(AtomicBool::new(false));
    let writer = PipeWriter {
        sender: Some(sender),
        buffer: Vec::with_capacity(BLOCK_SIZE),
        completed: Arc::clone(&completed),
        consumer_gone: false,
    };
    let reader = PipeReader {
        receiver,
        current: Vec::new(),
        position: 0,
        completed,
        producer_aborted: false,
    };
    (writer, reader)
}

/// Runs an upload-shaped transfer: the caller produces, the worker consumes.
///
/// The worker runs on its own thread and is joined before this returns.
/// When both sides fail, the worker's error wins if the producer only
/// failed because the worker stopped reading; otherwise the producer's
/// error is the root cause and wins.
///
/// # Errors
///
/// Returns the worker's or producer's error, or [`PipeError::WorkerPanicked`].
pub fn run_writable<T, E, W, P>(worker: W, producer: P) -> Result<T, E>
where
    T: Send,
    E: Send + From<PipeError> + From<io::Error>,
    W: FnOnce(PipeReader) -> Result<T, E> + Send,
    P: FnOnce(&mut PipeWriter) -> Result<(), E>,
{
    let (mut writer, reader) = pipe();
    thread::scope(|scope| {
        let handle = scope.spawn(move || worker(reader));
        let produced =
            producer(&mut writer).and_then(|()| writer.finish().map_err(E::from));
        let consumer_gone = writer.consumer_gone();
        drop(writer);
        let consumed = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(E::from(PipeError::WorkerPanicked)),
        };
        match (produced, consumed) {
            (Ok(()), consumed) => consumed,
            (Err(_), Err(worker_err)) if consumer_gone => Err(worker_err),
            (Err(producer_err), _) => Err(producer_err),
        }
    })
}

/// Runs a download-shaped transfer: the worker produces, the caller consumes.
///
/// The worker owns the writer and must call [`PipeWriter::finish`] after
/// its last byte; it should treat `BrokenPipe` as the consumer having
/// deliberately stopped early. When both sides fail, the worker's error
/// wins if the consumer only failed because the worker stopped producing.
///
/// # Errors
///
/// Returns the worker's or consumer's error, or [`PipeError::WorkerPanicked`].
pub fn run_readable<T, E, W, C>(worker: W, consumer: C) -> Result<T, E>
where
    E: Send + From<PipeError> + From<io::Error>,
    W: FnOnce(PipeWriter) -> Result<(), E> + Send,
    C: FnOnce(&mut PipeReader) -> Result<T, E>,
{
    let (writer, mut reader) = pipe();
    thread::scope(|scope| {
        let handle = scope.spawn(move || worker(writer));
        let consumed = consumer(&mut reader);
        let producer_aborted = reader.producer_aborted();
        drop(reader);
        let produced = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(E::from(PipeError::WorkerPanicked)),
        };
        match (consumed, produced) {
            (consumed, Ok(())) => consumed,
            (Err(_), Err(worker_err)) if producer_aborted => Err(worker_err),
            (Ok(_), Err(worker_err)) => Err(worker_err),
            (Err(consumer_err), Err(_)) => Err(consumer_err),
        }
    })
}

/// Reads from `reader` until `buf` is full or the stream ends.
///
/// Returns the number of bytes read, which is short only at end-of-stream.
///
/// # Errors
///
/// Returns the underlying reader error.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let count = reader.read(&mut buf[filled ..])?;
        if count == 0 {
            break;
        }
        filled += count;
    }
    Ok(filled)
}

/// Reader adapter that verifies a stored checksum once the stream is fully
/// consumed.
///
/// Verification is skipped when the consumer stops before end-of-stream;
/// a partial read proves nothing either way.
pub struct VerifyingReader<R> {
    /// Underlying byte source.
    inner: R,
    /// Checksum computation, absent when verification is disabled.
    rolling: Option<RollingChecksum>,
    /// Whether the stream was consumed to its end.
    reached_eof: bool,
}

impl<R: Read> VerifyingReader<R> {
    /// Wraps `inner`, verifying against `expected` when provided.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError`] when `expected` is malformed.
    pub fn new(inner: R, expected: Option<&str>) -> Result<Self, ChecksumError> {
        let rolling = match expected {
            Some(stored) => Some(RollingChecksum::matching(stored)?),
            None => None,
        };
        Ok(Self {
            inner,
            rolling,
            reached_eof: false,
        })
    }

    /// Completes verification.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Mismatch`] when the stream was fully
    /// consumed and the computed digest differs from the expected one.
    pub fn verify(self) -> Result<(), ChecksumError> {
        if self.reached_eof
            && let Some(rolling) = self.rolling
        {
            rolling.finish()?;
        }
        Ok(())
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count == 0 {
            if !buf.is_empty() {
                self.reached_eof = true;
            }
        } else if let Some(rolling) = &mut self.rolling {
            rolling.update(&buf[.. count]);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests;
