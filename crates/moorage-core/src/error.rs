// crates/moorage-core/src/error.rs
// ============================================================================
// Module: Job Store Errors
// Description: Error taxonomy for the job store surface.
// Purpose: Stable error variants for callers of the persistence layer.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every fallible operation on the job store surface returns
//! [`JobStoreError`]. Domain conditions (missing jobs, missing files,
//! concurrent modification) get dedicated variants callers can match on;
//! backend and transfer failures are wrapped transparently.

use thiserror::Error;

use crate::backend::AttributeStoreError;
use crate::backend::CipherError;
use crate::backend::ObjectStoreError;
use crate::checksum::ChecksumError;
use crate::codec::CodecError;
use crate::pipes::PipeError;

/// Job store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// The locator string is malformed or violates naming rules.
    #[error("invalid job store locator: {0}")]
    InvalidLocator(String),
    /// The store configuration carries an unusable value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Initialization was attempted for a store that is already registered.
    #[error("job store '{0}' already exists")]
    JobStoreExists(String),
    /// Resumption was attempted for a store that is not registered.
    #[error("no job store at '{0}'")]
    NoSuchJobStore(String),
    /// The requested job does not exist.
    #[error("no such job: {0}")]
    NoSuchJob(String),
    /// The requested file does not exist.
    #[error("no such file: {0}")]
    NoSuchFile(String),
    /// A file record save or delete lost an optimistic-concurrency race.
    #[error("concurrent modification of file {0}")]
    ConcurrentFileModification(String),
    /// The bound bucket lives in a different region than the locator names.
    #[error("bucket '{bucket}' is located in '{actual}', expected '{expected}'")]
    LocationConflict {
        /// Bucket whose location was checked.
        bucket: String,
        /// Region the bucket actually lives in.
        actual: String,
        /// Region the locator names.
        expected: String,
    },
    /// The bound bucket is not in the versioning state the store requires.
    #[error("bucket '{bucket}' has versioning state '{state}'")]
    VersioningConflict {
        /// Bucket whose versioning state was checked.
        bucket: String,
        /// Observed versioning state.
        state: String,
    },
    /// A stored item predates the current schema.
    #[error("incompatible item schema: {0}")]
    IncompatibleSchema(String),
    /// A shared file name violates the naming rules.
    #[error("invalid shared file name: {0}")]
    InvalidSharedFileName(String),
    /// Chunk codec failure on a stored item.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Checksum verification failure.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
    /// Attribute store failure that survived the retry budget.
    #[error(transparent)]
    AttributeStore(#[from] AttributeStoreError),
    /// Object store failure that survived the retry budget.
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
    /// Transfer pipe failure.
    #[error(transparent)]
    Pipe(#[from] PipeError),
    /// Content cipher failure.
    #[error(transparent)]
    Cipher(#[from] CipherError),
    /// Job descriptor serialization failure.
    #[error("job serialization failed: {0}")]
    Serialization(String),
    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for JobStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
