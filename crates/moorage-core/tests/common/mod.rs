// crates/moorage-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared helpers for moorage-core integration tests.
// Purpose: Build stores over in-memory backends with test-friendly tuning.
// Dependencies: moorage-core
// ============================================================================

//! ## Overview
//! Provides shared builders for job stores bound to in-memory backends so
//! lifecycle, job and file suites can exercise the full surface without
//! real cloud resources.

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
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use moorage_core::JobStore;
use moorage_core::Locator;
use moorage_core::StoreConfig;
use moorage_core::memory::MemoryAttributeStore;
use moorage_core::memory::MemoryObjectStore;
use moorage_core::retry::FixedBackoff;
use moorage_core::store::Clients;

/// Shared in-memory backends standing in for one cloud account.
pub struct TestBackends {
    /// Attribute store shared by every client bundle.
    pub attribute_store: Arc<MemoryAttributeStore>,
    /// Object store shared by every client bundle.
    pub object_store: MemoryObjectStore,
}

impl TestBackends {
    /// Creates fresh empty backends.
    pub fn new() -> Self {
        Self {
            attribute_store: Arc::new(MemoryAttributeStore::new()),
            object_store: MemoryObjectStore::new(),
        }
    }

    /// Builds a client bundle over these backends.
    pub fn clients(&self) -> Clients {
        let attribute_store: Arc<MemoryAttributeStore> = Arc::clone(&self.attribute_store);
        let object_store: Arc<MemoryObjectStore> = Arc::new(self.object_store.clone());
        Clients {
            attribute_store,
            object_store,
            retry: Arc::new(FixedBackoff::new(Duration::ZERO, 3)),
            cipher: None,
        }
    }
}

/// Configuration with small transfer sizes and no poll delays.
pub fn test_config(part_size: u64, max_inlined_size: usize) -> StoreConfig {
    StoreConfig {
        part_size,
        max_inlined_size,
        versioning_poll_interval: Duration::ZERO,
        ..StoreConfig::default()
    }
}

/// Parses the canonical test locator.
pub fn test_locator() -> Locator {
    Locator::parse("us-west-2:it-store").expect("valid locator")
}

/// Initializes a fresh store over the given backends.
pub fn initialize_store(backends: &TestBackends, config: StoreConfig) -> JobStore {
    JobStore::initialize(test_locator(), config, backends.clients()).expect("initialize")
}
