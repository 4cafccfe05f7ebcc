// crates/moorage-core/src/lib.rs
// ============================================================================
// Module: Moorage Core
// Description: Persistence layer for workflow job metadata and file blobs.
// Purpose: Job/file records over an attribute store and a versioned object store.
// ============================================================================

//! ## Overview
//! Moorage persists the job descriptors and file blobs of a distributed
//! workflow engine on two cloud primitives: a schema-less attribute store
//! with strongly consistent conditional writes, and a versioned object
//! store with multipart uploads. Small payloads are chunk-encoded straight
//! into attribute items; large payloads stream into versioned objects with
//! rolling checksums. Cross-process safety comes exclusively from the
//! attribute store's conditional-write primitive plus a shared registry
//! domain tracking which stores exist.
//!
//! Backends are injected through the [`AttributeStore`] and [`ObjectStore`]
//! traits; [`memory`] provides strongly consistent in-process
//! implementations used by the test suites.

/// Injected backend seams: attribute store, object store, cipher contract.
pub mod backend;
/// Rolling checksums in `algorithm$hexdigest` form.
pub mod checksum;
/// Chunked binary-to-attribute codec.
pub mod codec;
/// Store configuration.
pub mod config;
/// Shared resource context injected into records.
pub mod context;
/// Error taxonomy for the job store surface.
pub mod error;
/// Versioned file records with optimistic concurrency.
pub mod file_record;
/// Job descriptor model.
pub mod job;
/// Job descriptor (de)serialization into attribute items.
pub mod job_codec;
/// Locator strings identifying a store instance.
pub mod locator;
/// In-memory backend implementations.
pub mod memory;
/// Streaming transfer pipes between caller and transfer worker.
pub mod pipes;
/// Retry policy contract and transient-error helpers.
pub mod retry;
/// Job store lifecycle and CRUD surface.
pub mod store;

pub use backend::AttributeStore;
pub use backend::ContentCipher;
pub use backend::ObjectStore;
pub use backend::SseKey;
pub use backend::VersioningState;
pub use checksum::ChecksumError;
pub use config::StoreConfig;
pub use error::JobStoreError;
pub use file_record::FileId;
pub use file_record::FileRecord;
pub use job::JobDescriptor;
pub use job::JobId;
pub use locator::Locator;
pub use retry::FixedBackoff;
pub use retry::RetryPolicy;
pub use store::Clients;
pub use store::JobBatch;
pub use store::JobStore;
