//! CSV batch materializer
//!
//! Writes each fetched page to its own CSV file in the staging directory as
//! soon as it arrives, so at most one page of records is held in memory.

use crate::error::{Error, Result};
use crate::pagination::Page;
use crate::types::JsonValue;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ============================================================================
// Staged Artifact
// ============================================================================

/// One page of records staged on local disk, waiting for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// Object label (CRM object type or table)
    pub object: String,
    /// Batch number within the object, starting at 0
    pub sequence: usize,
    /// Number of data rows
    pub row_count: usize,
    /// Header columns in file order
    pub columns: Vec<String>,
    /// Local file path
    pub path: PathBuf,
}

/// Staged artifacts of one run, deleted from disk when dropped
#[derive(Debug, Default)]
pub struct StagedArtifacts {
    artifacts: Vec<StagedArtifact>,
}

impl StagedArtifacts {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a staged artifact
    pub fn push(&mut self, artifact: StagedArtifact) {
        self.artifacts.push(artifact);
    }

    /// Artifacts in staging order
    pub fn as_slice(&self) -> &[StagedArtifact] {
        &self.artifacts
    }

    /// Number of artifacts
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether nothing was staged
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Total data rows across all artifacts
    pub fn total_rows(&self) -> usize {
        self.artifacts.iter().map(|a| a.row_count).sum()
    }

    /// Delete every staged file; returns how many were removed
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for artifact in self.artifacts.drain(..) {
            match std::fs::remove_file(&artifact.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %artifact.path.display(),
                    error = %e,
                    "failed to delete staged artifact"
                ),
            }
        }
        if removed > 0 {
            debug!(removed, "deleted staged artifacts");
        }
        removed
    }
}

impl Drop for StagedArtifacts {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ============================================================================
// Batch Materializer
// ============================================================================

/// Turns pages into CSV files in a staging directory
#[derive(Debug, Clone)]
pub struct BatchMaterializer {
    staging_dir: PathBuf,
    source: String,
}

impl BatchMaterializer {
    /// Create a materializer staging files for `source` under `staging_dir`
    pub fn new(staging_dir: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            source: source.into(),
        }
    }

    /// Local file name for one batch
    pub fn file_name(&self, object: &str, sequence: usize) -> String {
        format!(
            "{}_{}_batch_{sequence}.csv",
            sanitize(&self.source),
            sanitize(object)
        )
    }

    /// Write a page to CSV; an empty page stages nothing
    pub fn materialize(
        &self,
        page: &Page,
        object: &str,
        sequence: usize,
    ) -> Result<Option<StagedArtifact>> {
        if page.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.staging_dir)?;
        let path = self.staging_dir.join(self.file_name(object, sequence));

        let columns: Vec<String> = page
            .records
            .iter()
            .flat_map(|record| record.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if let Err(e) = write_csv(&path, &columns, page) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        debug!(
            object,
            sequence,
            rows = page.len(),
            path = %path.display(),
            "staged batch"
        );

        Ok(Some(StagedArtifact {
            object: object.to_string(),
            sequence,
            row_count: page.len(),
            columns,
            path,
        }))
    }
}

fn write_csv(path: &Path, columns: &[String], page: &Page) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns)?;

    for record in &page.records {
        for column in columns {
            let field = record.get(column).map_or(Cow::Borrowed(""), field_text);
            writer.write_field(field.as_bytes())?;
        }
        // An empty record terminates the fields written above
        writer.write_record(None::<&[u8]>)?;
    }

    writer
        .flush()
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))
}

/// Text for one CSV field
pub(crate) fn field_text(value: &JsonValue) -> Cow<'_, str> {
    match value {
        JsonValue::Null => Cow::Borrowed(""),
        JsonValue::String(s) => Cow::Borrowed(s),
        JsonValue::Bool(b) => Cow::Owned(b.to_string()),
        JsonValue::Number(n) => Cow::Owned(n.to_string()),
        nested => Cow::Owned(nested.to_string()),
    }
}

fn sanitize(segment: &str) -> Cow<'_, str> {
    if segment.contains(['/', '\\']) {
        Cow::Owned(segment.replace(['/', '\\'], "_"))
    } else {
        Cow::Borrowed(segment)
    }
}
