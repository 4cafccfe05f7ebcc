// crates/moorage-core/src/checksum.rs
// ============================================================================
// Module: Rolling Checksums
// Description: Streaming SHA-256 checksums in `algorithm$hexdigest` form.
// Purpose: Verify blob integrity across upload and download transfers.
// Dependencies: sha2, thiserror
// ============================================================================

//! ## Overview
//! Stored checksums are strings of the form `algorithm$hexdigest` so the
//! verifying side can recover the algorithm from the stored value instead
//! of assuming one. A [`RollingChecksum`] is fed data as it streams past;
//! finishing it either yields the checksum string or, when an expected
//! value was supplied up front, raises [`ChecksumError::Mismatch`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Algorithm tag written for newly computed checksums.
pub const DEFAULT_ALGORITHM: &str = "sha256";

/// Read buffer size for whole-file checksumming.
const FILE_READ_BUFFER: usize = 1024 * 1024;

/// Checksum errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// Computed digest does not match the expected digest.
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    Mismatch {
        /// Stored digest the transfer was expected to match.
        expected: String,
        /// Digest actually computed from the transferred bytes.
        actual: String,
    },
    /// The checksum string names an algorithm this build cannot compute.
    #[error("unsupported checksum algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The checksum string is not of the `algorithm$hexdigest` form.
    #[error("malformed checksum string: {0}")]
    Malformed(String),
}

/// A checksum computation in progress.
pub struct RollingChecksum {
    /// Hash state updated as data streams past.
    hasher: Sha256,
    /// Expected hex digest, when verifying against a stored checksum.
    expected: Option<String>,
}

impl RollingChecksum {
    /// Starts a fresh checksum computation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            expected: None,
        }
    }

    /// Starts a checksum computation that must match `stored`.
    ///
    /// The algorithm is taken from the stored string so the comparison uses
    /// whatever the writer used.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError`] when `stored` is malformed or names an
    /// unsupported algorithm.
    pub fn matching(stored: &str) -> Result<Self, ChecksumError> {
        let (algorithm, digest) = stored
            .split_once('$')
            .ok_or_else(|| ChecksumError::Malformed(stored.to_string()))?;
        if algorithm != DEFAULT_ALGORITHM {
            return Err(ChecksumError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        Ok(Self {
            hasher: Sha256::new(),
            expected: Some(digest.to_string()),
        })
    }

    /// Feeds transferred bytes into the checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Completes the computation and returns the checksum string.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Mismatch`] when an expected digest was
    /// supplied and the computed digest differs.
    pub fn finish(self) -> Result<String, ChecksumError> {
        let actual = hex_digest(&self.hasher.finalize());
        if let Some(expected) = self.expected
            && expected != actual
        {
            return Err(ChecksumError::Mismatch {
                expected,
                actual,
            });
        }
        Ok(format!("{DEFAULT_ALGORITHM}${actual}"))
    }
}

impl Default for RollingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the checksum of a local file, optionally verifying it.
///
/// # Errors
///
/// Returns the underlying I/O error, or [`ChecksumError`] wrapped in
/// `InvalidData` when verification fails.
pub fn file_checksum(path: &Path, to_match: Option<&str>) -> std::io::Result<String> {
    let mut rolling = match to_match {
        Some(stored) => RollingChecksum::matching(stored)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?,
        None => RollingChecksum::new(),
    };
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; FILE_READ_BUFFER];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        rolling.update(&buffer[.. read]);
    }
    rolling.finish().map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

/// Encodes a digest as lowercase hex.
fn hex_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::ChecksumError;
    use super::RollingChecksum;

    #[test]
    fn checksum_has_algorithm_prefix_and_lowercase_hex() {
        let mut rolling = RollingChecksum::new();
        rolling.update(b"test");
        let checksum = rolling.finish().expect("finish");
        assert_eq!(
            checksum,
            "sha256$9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn matching_checksum_verifies() {
        let mut first = RollingChecksum::new();
        first.update(b"payload");
        let stored = first.finish().expect("finish");

        let mut second = RollingChecksum::matching(&stored).expect("matching");
        second.update(b"payload");
        assert!(second.finish().is_ok());
    }

    #[test]
    fn mismatching_checksum_fails() {
        let mut first = RollingChecksum::new();
        first.update(b"payload");
        let stored = first.finish().expect("finish");

        let mut second = RollingChecksum::matching(&stored).expect("matching");
        second.update(b"tampered");
        let result = second.finish();
        assert!(matches!(result, Err(ChecksumError::Mismatch { .. })));
    }

    #[test]
    fn malformed_stored_checksum_is_rejected() {
        let result = RollingChecksum::matching("sha256-no-separator");
        assert!(matches!(result, Err(ChecksumError::Malformed(_))));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let result = RollingChecksum::matching("md4$abcdef");
        assert!(matches!(result, Err(ChecksumError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn incremental_updates_match_single_update() {
        let mut split = RollingChecksum::new();
        split.update(b"pay");
        split.update(b"load");
        let mut whole = RollingChecksum::new();
        whole.update(b"payload");
        assert_eq!(split.finish().expect("split"), whole.finish().expect("whole"));
    }
}
