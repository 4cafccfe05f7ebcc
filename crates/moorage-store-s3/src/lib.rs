// crates/moorage-store-s3/src/lib.rs
// ============================================================================
// Module: Moorage S3 Store
// Description: AWS S3 implementation of the Moorage object-store seam.
// Purpose: Versioned buckets, multipart uploads and SSE-C over the AWS SDK.
// ============================================================================

//! ## Overview
//! Implements [`moorage_core::ObjectStore`] on AWS S3. Calls block on an
//! owned multi-thread Tokio runtime so the synchronous store surface stays
//! free of async plumbing. Customer-supplied encryption keys are forwarded
//! as SSE-C headers on every object operation.

/// S3-backed object store and its configuration.
pub mod object_store;

pub use object_store::S3ObjectStore;
pub use object_store::S3ObjectStoreConfig;
