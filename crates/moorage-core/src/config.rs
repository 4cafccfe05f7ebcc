// crates/moorage-core/src/config.rs
// ============================================================================
// Module: Store Configuration
// Description: Tunable parameters of one job store instance.
// Purpose: Centralize transfer sizing, verification and key settings.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`StoreConfig`] collects every knob the persistence layer exposes. All
//! fields have working defaults; deserializing an empty document yields the
//! default configuration. Validation happens once when a store is
//! constructed, not on every operation.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::JobStoreError;

/// Default object part size in bytes (50 MiB).
pub const DEFAULT_PART_SIZE: u64 = 50 * 1024 * 1024;

/// Default ceiling for inlining file content into attribute items.
pub const DEFAULT_MAX_INLINED_SIZE: usize = 256;

/// Default delay between bucket versioning polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of bucket versioning polls before giving up.
const DEFAULT_POLL_ATTEMPTS: u32 = 60;

/// Tunable parameters of one job store instance.
///
/// # Invariants
/// - `part_size` is non-zero; `validate` enforces this.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreConfig {
    /// Size of each part of a multipart object upload, in bytes.
    pub part_size: u64,
    /// Largest file content, in bytes, stored inline in attribute items.
    pub max_inlined_size: usize,
    /// Whether downloads verify stored checksums.
    pub verify_checksums: bool,
    /// Path of a 32-byte customer-supplied encryption key, if any.
    pub sse_key_path: Option<PathBuf>,
    /// Delay between polls while waiting for bucket versioning to activate.
    #[serde(with = "poll_interval_secs")]
    pub versioning_poll_interval: Duration,
    /// Number of versioning polls before initialization gives up.
    pub versioning_poll_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            max_inlined_size: DEFAULT_MAX_INLINED_SIZE,
            verify_checksums: true,
            sse_key_path: None,
            versioning_poll_interval: DEFAULT_POLL_INTERVAL,
            versioning_poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

impl StoreConfig {
    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::InvalidConfig`] when a value is unusable.
    pub fn validate(&self) -> Result<(), JobStoreError> {
        if self.part_size == 0 {
            return Err(JobStoreError::InvalidConfig("part_size must be non-zero".to_string()));
        }
        if self.versioning_poll_attempts == 0 {
            return Err(JobStoreError::InvalidConfig(
                "versioning_poll_attempts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde shim mapping `versioning_poll_interval` to whole seconds.
mod poll_interval_secs {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;

    /// Deserializes a second count into a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns the underlying deserializer error.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::DEFAULT_MAX_INLINED_SIZE;
    use super::DEFAULT_PART_SIZE;
    use super::StoreConfig;

    #[test]
    fn defaults_are_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.part_size, DEFAULT_PART_SIZE);
        assert_eq!(config.max_inlined_size, DEFAULT_MAX_INLINED_SIZE);
        assert!(config.verify_checksums);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.part_size, DEFAULT_PART_SIZE);
    }

    #[test]
    fn fields_override_defaults() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"part_size": 64, "max_inlined_size": 16, "versioning_poll_interval": 2}"#,
        )
        .expect("deserialize");
        assert_eq!(config.part_size, 64);
        assert_eq!(config.max_inlined_size, 16);
        assert_eq!(config.versioning_poll_interval.as_secs(), 2);
    }

    #[test]
    fn zero_part_size_is_rejected() {
        let config = StoreConfig {
            part_size: 0,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<StoreConfig, _> = serde_json::from_str(r#"{"part_syze": 64}"#);
        assert!(result.is_err());
    }
}
