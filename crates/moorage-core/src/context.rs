// crates/moorage-core/src/context.rs
// ============================================================================
// Module: Store Context
// Description: Shared resource handles threaded through records.
// Purpose: Give records access to backends without a store back-reference.
// Dependencies: (internal seams only)
// ============================================================================

//! ## Overview
//! File and job records need the backend clients, the resource names they
//! were bound to, the retry policy and the transfer configuration. Rather
//! than holding a reference back to the owning store, records share a
//! [`StoreContext`] behind an `Arc`, so they stay independently movable
//! and testable.

use std::sync::Arc;

use crate::backend::AttributeStore;
use crate::backend::ContentCipher;
use crate::backend::ObjectStore;
use crate::backend::SseKey;
use crate::config::StoreConfig;
use crate::retry::RetryPolicy;

/// Shared resource handles of one bound job store.
///
/// # Invariants
/// - `files_domain` and `bucket` name resources that exist for the
///   lifetime of the context.
pub struct StoreContext {
    /// Attribute store client.
    pub attribute_store: Arc<dyn AttributeStore>,
    /// Object store client.
    pub object_store: Arc<dyn ObjectStore>,
    /// Retry policy for transient backend failures.
    pub retry: Arc<dyn RetryPolicy>,
    /// Cipher for inlined content of encrypted records, when configured.
    pub cipher: Option<Arc<dyn ContentCipher>>,
    /// Customer-supplied object encryption key, when configured.
    pub sse_key: Option<SseKey>,
    /// Transfer and verification configuration.
    pub config: StoreConfig,
    /// Domain holding file record items.
    pub files_domain: String,
    /// Bucket holding file content objects.
    pub bucket: String,
}

impl StoreContext {
    /// Returns the SSE key to apply to an object operation, if any.
    #[must_use]
    pub fn sse(&self) -> Option<&SseKey> {
        self.sse_key.as_ref()
    }

    /// Whether records default to encrypted content.
    #[must_use]
    pub fn encryption_enabled(&self) -> bool {
        self.sse_key.is_some() || self.cipher.is_some()
    }
}
