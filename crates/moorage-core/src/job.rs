// crates/moorage-core/src/job.rs
// ============================================================================
// Module: Job Model
// Description: Job identifiers and the persisted job descriptor.
// Purpose: Typed job metadata serialized through the job codec.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! A [`JobDescriptor`] is the unit of work the workflow scheduler hands to
//! the persistence layer. The storage code treats it as an opaque
//! serde-serializable blob; only its [`JobId`] matters for addressing. The
//! descriptor carries the fields the scheduler needs back after a resume:
//! the command, resource requirements, retry budget and dependency links.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Unique identifier of one persisted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a job id from its string form.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for malformed input.
    pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(raw).map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Resource requirements of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobRequirements {
    /// CPU cores requested.
    pub cores: f64,
    /// Memory requested, in bytes.
    pub memory: u64,
    /// Scratch disk requested, in bytes.
    pub disk: u64,
    /// Whether the job tolerates preemptible capacity.
    pub preemptible: bool,
}

/// Persisted description of one schedulable job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Identifier the job is stored under.
    pub id: JobId,
    /// Human-readable job name.
    pub name: String,
    /// Command line the job runs, when it is a command job.
    pub command: Option<String>,
    /// Resource requirements.
    pub requirements: JobRequirements,
    /// Remaining retry budget.
    pub remaining_tries: u32,
    /// Jobs that must complete before this one becomes runnable.
    pub predecessors: Vec<JobId>,
    /// Environment overrides applied when the job runs.
    pub environment: BTreeMap<String, String>,
}

impl JobDescriptor {
    /// Creates a descriptor with a fresh id and default requirements.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            command: None,
            requirements: JobRequirements::default(),
            remaining_tries: 1,
            predecessors: Vec::new(),
            environment: BTreeMap::new(),
        }
    }
}
