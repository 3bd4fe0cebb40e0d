//! Execution engine module
//!
//! Two-phase run orchestration: extract everything, then upload everything.
//!
//! # Overview
//!
//! The engine module provides:
//! - `Extraction` - Pulls pages from a source and stages them, one artifact per call
//! - `RunEngine` - Drives extraction, upload and cleanup for one source
//! - `RunConfig` / `RunReport` / `RunPhase` - Run settings and outcome

mod types;

pub use types::{RunConfig, RunPhase, RunReport};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{
    BatchMaterializer, DatePrefix, ObjectStorage, RemoteDestination, StagedArtifact,
    StagedArtifacts, UploadCommitter,
};
use crate::pagination::PaginationState;
use crate::source::Source;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

// ============================================================================
// Extraction
// ============================================================================

/// Lazy sequence of staged artifacts for one source.
///
/// Objects are drained in the source's order. Each call to [`next`](Self::next)
/// fetches pages until one produces an artifact, so only one page is held in
/// memory. After an error the sequence is finished.
pub struct Extraction<'a> {
    source: &'a mut dyn Source,
    materializer: &'a BatchMaterializer,
    objects: Vec<String>,
    index: usize,
    state: PaginationState,
    sequence: usize,
    limit: usize,
    finished: bool,
}

impl<'a> Extraction<'a> {
    /// Validate the window and prepare the sequence.
    ///
    /// No adapter call is made here; an invalid window fails with
    /// [`Error::Validation`].
    pub fn new(
        source: &'a mut dyn Source,
        materializer: &'a BatchMaterializer,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Self> {
        source.validate_window(window_start, window_end)?;

        let objects = source.objects();
        let limit = source.descriptor().batch_size;
        info!(
            source = %source.descriptor().name,
            objects = ?objects,
            %window_start,
            %window_end,
            "starting extraction"
        );

        Ok(Self {
            source,
            materializer,
            objects,
            index: 0,
            state: PaginationState::new(),
            sequence: 0,
            limit,
            finished: false,
        })
    }

    /// Objects that will be drained, in order
    pub fn objects(&self) -> &[String] {
        &self.objects
    }

    /// Whether the sequence is exhausted or failed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stage the next artifact; `None` once every object is drained
    pub async fn next(&mut self) -> Option<Result<StagedArtifact>> {
        loop {
            if self.finished {
                return None;
            }
            let Some(object) = self.objects.get(self.index).cloned() else {
                self.finished = true;
                return None;
            };

            if self.state.done {
                info!(
                    object = %object,
                    pages = self.state.pages,
                    records = self.state.total_fetched,
                    "object exhausted"
                );
                self.index += 1;
                self.state = PaginationState::new();
                self.sequence = 0;
                continue;
            }

            match self.step(&object).await {
                Ok(Some(artifact)) => return Some(Ok(artifact)),
                Ok(None) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    async fn step(&mut self, object: &str) -> Result<Option<StagedArtifact>> {
        let page = self
            .source
            .fetch_page(object, self.state.cursor.as_ref(), self.limit)
            .await?;
        debug!(object, page = self.state.pages, records = page.len(), "fetched page");

        self.state.advance(object, &page)?;
        if page.is_empty() {
            self.state.mark_done();
            return Ok(None);
        }

        let artifact = self.materializer.materialize(&page, object, self.sequence)?;
        if artifact.is_some() {
            self.sequence += 1;
        }
        Ok(artifact)
    }
}

// ============================================================================
// Run Engine
// ============================================================================

/// Runs extract-then-upload for one source
pub struct RunEngine<'a> {
    storage: &'a dyn ObjectStorage,
    client: String,
    staging_dir: PathBuf,
    config: RunConfig,
    report: RunReport,
}

impl<'a> RunEngine<'a> {
    /// Create an engine writing to `storage` under `client`
    pub fn new(
        storage: &'a dyn ObjectStorage,
        client: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            client: client.into(),
            staging_dir: staging_dir.into(),
            config: RunConfig::default(),
            report: RunReport::default(),
        }
    }

    /// Create an engine from the loaded configuration
    pub fn from_config(config: &Config, storage: &'a dyn ObjectStorage) -> Self {
        Self::new(storage, config.client.clone(), config.staging_dir.clone())
    }

    /// Set run configuration
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Report of the last run
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Extract `[window_start, window_end)` from `source`, then upload.
    ///
    /// Staged files are deleted whatever the outcome.
    pub async fn run(
        &mut self,
        source: &mut dyn Source,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<RemoteDestination>> {
        let start = Instant::now();
        self.report = RunReport::new(source.descriptor().name.clone());
        self.enter(RunPhase::Init);

        let mut staged = StagedArtifacts::new();
        let result = self
            .execute(source, window_start, window_end, &mut staged)
            .await;

        if let Err(e) = &result {
            error!(source = %self.report.source, error = %e, "run failed");
            if let Error::PartialUpload { committed, .. } = e {
                self.report.artifacts_committed = *committed;
            }
            self.enter(RunPhase::Failed);
        }

        self.enter(RunPhase::CleaningUp);
        self.report.artifacts_removed = staged.cleanup();

        #[allow(clippy::cast_possible_truncation)]
        self.report.set_duration(start.elapsed().as_millis() as u64);

        let destinations = result?;
        self.enter(RunPhase::Done);
        info!(
            source = %self.report.source,
            artifacts = self.report.artifacts_committed,
            rows = self.report.rows_staged,
            duration_ms = self.report.duration_ms,
            "run complete"
        );
        Ok(destinations)
    }

    async fn execute(
        &mut self,
        source: &mut dyn Source,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        staged: &mut StagedArtifacts,
    ) -> Result<Vec<RemoteDestination>> {
        let descriptor = source.descriptor().clone();
        let materializer = BatchMaterializer::new(&self.staging_dir, &descriptor.name);

        self.enter(RunPhase::ValidatingWindow);
        let mut extraction = Extraction::new(source, &materializer, window_start, window_end)?;

        self.enter(RunPhase::Extracting);
        while let Some(artifact) = extraction.next().await {
            let artifact = artifact?;
            self.report.add_artifact(&artifact);
            staged.push(artifact);
        }
        self.enter(RunPhase::Extracted);
        info!(
            source = %descriptor.name,
            artifacts = staged.len(),
            rows = staged.total_rows(),
            "extraction complete"
        );

        self.enter(RunPhase::Uploading);
        let date_prefix = self.config.date_prefix.clone().unwrap_or_else(DatePrefix::now);
        let committer = UploadCommitter::new(self.storage, self.client.clone())
            .with_policy(self.config.policy)
            .with_verify(self.config.verify_uploads);
        if self.config.validate_storage {
            committer.validate_access().await?;
        }

        let destinations = match committer
            .commit_all(staged.as_slice(), &descriptor, &date_prefix)
            .await
        {
            Ok(destinations) => destinations,
            Err(e) => {
                if let Error::PartialUpload { committed, .. } = &e {
                    self.report.destinations = staged.as_slice()[..*committed]
                        .iter()
                        .map(|a| committer.destination(&descriptor, &date_prefix, &a.object))
                        .collect();
                }
                return Err(e);
            }
        };
        self.report.artifacts_committed = destinations.len();
        self.report.destinations = destinations.clone();
        Ok(destinations)
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(source = %self.report.source, %phase, "run phase");
        self.report.phases.push(phase);
    }
}

#[cfg(test)]
mod tests;
