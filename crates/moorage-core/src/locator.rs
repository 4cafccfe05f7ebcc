// crates/moorage-core/src/locator.rs
// ============================================================================
// Module: Store Locator
// Description: Parsing and validation of `region:name_prefix` locators.
// Purpose: Derive the backing resource names for one job store instance.
// ============================================================================

//! ## Overview
//! External callers identify a job store by a locator of the form
//! `region:name_prefix`. The prefix is embedded into bucket and domain
//! names, so it inherits the object store's bucket naming rules: lowercase
//! alphanumerics and single hyphens, 3 to 63 characters overall. The
//! locator additionally reserves room for the fixed resource-name suffixes
//! appended with a double-hyphen separator.

use std::fmt;
use std::str::FromStr;

use crate::error::JobStoreError;

/// Separator between the name prefix and a resource suffix.
///
/// Dots are avoided because bucket names appear in HTTPS bucket URLs where
/// they would interfere with the certificate common name.
pub const NAME_SEPARATOR: &str = "--";

/// Minimum length of a bucket name.
const MIN_BUCKET_NAME_LEN: usize = 3;
/// Maximum length of a bucket name.
const MAX_BUCKET_NAME_LEN: usize = 63;
/// Maximum length of a resource suffix appended to the prefix.
const MAX_SUFFIX_LEN: usize = 10;
/// Maximum length of a name prefix, leaving room for separator and suffix.
pub const MAX_NAME_PREFIX_LEN: usize = MAX_BUCKET_NAME_LEN - MAX_SUFFIX_LEN - NAME_SEPARATOR.len();

/// Identity of one job store instance: `(region, name_prefix)`.
///
/// # Invariants
/// - `name_prefix` satisfies the bucket naming rules and is short enough to
///   carry the internal resource suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// Region hosting the backing resources.
    region: String,
    /// Prefix from which the resource names are derived.
    name_prefix: String,
}

impl Locator {
    /// Parses a `region:name_prefix` locator string.
    ///
    /// # Errors
    ///
    /// Returns [`JobStoreError::InvalidLocator`] when the string is not of
    /// the expected shape or the name prefix violates the naming rules.
    pub fn parse(locator: &str) -> Result<Self, JobStoreError> {
        let Some((region, name_prefix)) = locator.split_once(':') else {
            return Err(JobStoreError::InvalidLocator(format!(
                "locator '{locator}' is not of the form region:name-prefix"
            )));
        };
        if region.is_empty() {
            return Err(JobStoreError::InvalidLocator(format!(
                "locator '{locator}' has an empty region"
            )));
        }
        validate_name_prefix(name_prefix)?;
        Ok(Self {
            region: region.to_string(),
            name_prefix: name_prefix.to_string(),
        })
    }

    /// Returns the region component.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the name prefix component.
    #[must_use]
    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    /// Derives the full resource name for a fixed suffix.
    #[must_use]
    pub(crate) fn qualify(&self, suffix: &str) -> String {
        format!("{}{}{}", self.name_prefix, NAME_SEPARATOR, suffix)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.region, self.name_prefix)
    }
}

impl FromStr for Locator {
    type Err = JobStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validates a name prefix against the bucket naming rules.
fn validate_name_prefix(name_prefix: &str) -> Result<(), JobStoreError> {
    if name_prefix.len() < MIN_BUCKET_NAME_LEN {
        return Err(JobStoreError::InvalidLocator(format!(
            "name prefix '{name_prefix}' is shorter than {MIN_BUCKET_NAME_LEN} characters"
        )));
    }
    if name_prefix.len() > MAX_NAME_PREFIX_LEN {
        return Err(JobStoreError::InvalidLocator(format!(
            "name prefix '{name_prefix}' is longer than {MAX_NAME_PREFIX_LEN} characters"
        )));
    }
    let valid_inner = name_prefix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = name_prefix.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name_prefix.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !valid_inner || !valid_edges {
        return Err(JobStoreError::InvalidLocator(format!(
            "name prefix '{name_prefix}' must contain only digits, hyphens or lower-case \
             letters and must not start or end in a hyphen"
        )));
    }
    if name_prefix.contains(NAME_SEPARATOR) {
        return Err(JobStoreError::InvalidLocator(format!(
            "name prefix '{name_prefix}' must not contain '{NAME_SEPARATOR}'"
        )));
    }
    Ok(())
}
