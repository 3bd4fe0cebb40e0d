//! Engine types
//!
//! Run phases, run configuration and the report of a run.

use crate::output::{DatePrefix, RemoteDestination, StagedArtifact};
use crate::types::ConflictPolicy;
use std::fmt;

/// Phase of a two-phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Nothing done yet
    Init,
    /// Checking the requested window against the source
    ValidatingWindow,
    /// Fetching pages and staging them locally
    Extracting,
    /// Every object exhausted, nothing uploaded yet
    Extracted,
    /// Committing staged artifacts
    Uploading,
    /// Deleting staged artifacts
    CleaningUp,
    /// Finished successfully
    Done,
    /// A step failed; cleanup follows
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::ValidatingWindow => "validating_window",
            RunPhase::Extracting => "extracting",
            RunPhase::Extracted => "extracted",
            RunPhase::Uploading => "uploading",
            RunPhase::CleaningUp => "cleaning_up",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Configuration for a run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Policy for the first artifact of each object
    pub policy: ConflictPolicy,
    /// Read every upload back and compare
    pub verify_uploads: bool,
    /// Probe storage write access before uploading
    pub validate_storage: bool,
    /// Fixed date prefix; computed when the upload phase starts if unset
    pub date_prefix: Option<DatePrefix>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            policy: ConflictPolicy::Replace,
            verify_uploads: true,
            validate_storage: false,
            date_prefix: None,
        }
    }
}

impl RunConfig {
    /// Create a new run config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first-batch conflict policy
    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable upload read-back
    #[must_use]
    pub fn with_verify_uploads(mut self, verify: bool) -> Self {
        self.verify_uploads = verify;
        self
    }

    /// Enable or disable the storage access probe
    #[must_use]
    pub fn with_validate_storage(mut self, validate: bool) -> Self {
        self.validate_storage = validate;
        self
    }

    /// Pin the date prefix
    #[must_use]
    pub fn with_date_prefix(mut self, date_prefix: DatePrefix) -> Self {
        self.date_prefix = Some(date_prefix);
        self
    }
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Source name
    pub source: String,
    /// Phases entered, in order
    pub phases: Vec<RunPhase>,
    /// Artifacts staged
    pub artifacts_staged: usize,
    /// Rows staged
    pub rows_staged: usize,
    /// Artifacts committed before the upload phase ended
    pub artifacts_committed: usize,
    /// Staged files deleted during cleanup
    pub artifacts_removed: usize,
    /// Remote objects written, in commit order
    pub destinations: Vec<RemoteDestination>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Create an empty report for `source`
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Record a staged artifact
    pub fn add_artifact(&mut self, artifact: &StagedArtifact) {
        self.artifacts_staged += 1;
        self.rows_staged += artifact.row_count;
    }

    /// Current phase
    pub fn phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Init)
    }

    /// Whether the run reached `Done`
    pub fn succeeded(&self) -> bool {
        self.phase() == RunPhase::Done
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
