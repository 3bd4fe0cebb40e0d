//! Upload committer
//!
//! Commits staged artifacts one at a time, in staging order. The first
//! artifact of each object uses the configured policy, later ones append.
//! The first failure aborts the remaining uploads; nothing is retried here.

use super::cloud::ObjectStorage;
use super::path::{resolve, DatePrefix, RemoteDestination};
use super::writer::StagedArtifact;
use crate::config::SourceDescriptor;
use crate::error::{Error, Result};
use crate::types::ConflictPolicy;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Commits staged artifacts to object storage
pub struct UploadCommitter<'a> {
    storage: &'a dyn ObjectStorage,
    client: String,
    first_batch_policy: ConflictPolicy,
    verify_uploads: bool,
}

impl<'a> UploadCommitter<'a> {
    /// Create a committer for `client` writing to `storage`
    pub fn new(storage: &'a dyn ObjectStorage, client: impl Into<String>) -> Self {
        Self {
            storage,
            client: client.into(),
            first_batch_policy: ConflictPolicy::Replace,
            verify_uploads: true,
        }
    }

    /// Policy for the first artifact of each object
    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.first_batch_policy = policy;
        self
    }

    /// Read every object back after writing it
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify_uploads = verify;
        self
    }

    /// Write, read back and delete a probe object
    pub async fn validate_access(&self) -> Result<()> {
        let probe_path = format!(
            "{}/.gaon_access_check_{}",
            self.client,
            Utc::now().timestamp_millis()
        );
        let payload = Bytes::from_static(b"gaon access check");

        let outcome = async {
            self.storage.put_object(&probe_path, payload.clone()).await?;
            let read_back = self.storage.get_object(&probe_path).await?;
            if read_back != payload {
                return Err(Error::Other("probe content mismatch".to_string()));
            }
            self.storage.delete_object(&probe_path).await
        }
        .await;

        outcome.map_err(|e| Error::connection(format!("bucket {}", self.storage.bucket()), e.to_string()))?;
        debug!(bucket = self.storage.bucket(), "storage access validated");
        Ok(())
    }

    /// Remote destination of `object` for this run
    pub fn destination(
        &self,
        descriptor: &SourceDescriptor,
        date_prefix: &DatePrefix,
        object: &str,
    ) -> RemoteDestination {
        RemoteDestination {
            bucket: self.storage.bucket().to_string(),
            path: resolve(&self.client, &descriptor.name, date_prefix.as_str(), object),
        }
    }

    /// Commit every artifact in order
    ///
    /// On the first failure the remaining artifacts are skipped and the error
    /// reports how many were committed.
    pub async fn commit_all(
        &self,
        artifacts: &[StagedArtifact],
        descriptor: &SourceDescriptor,
        date_prefix: &DatePrefix,
    ) -> Result<Vec<RemoteDestination>> {
        let total = artifacts.len();
        let mut seen: HashSet<&str> = HashSet::new();
        // Content of the object written last, so its next batch skips a download
        let mut carried: Option<(&str, Bytes)> = None;
        let mut committed = Vec::with_capacity(total);

        for artifact in artifacts {
            let destination = self.destination(descriptor, date_prefix, &artifact.object);
            let policy = if seen.insert(artifact.object.as_str()) {
                self.first_batch_policy
            } else {
                ConflictPolicy::Append
            };
            let known = carried
                .as_ref()
                .filter(|(object, _)| *object == artifact.object)
                .map(|(_, content)| content);

            let outcome = self.write(artifact, &destination.path, policy, known).await;
            match outcome {
                Ok(content) => carried = Some((artifact.object.as_str(), content)),
                Err(e) => {
                    return Err(Error::PartialUpload {
                        committed: committed.len(),
                        total,
                        source: Box::new(e),
                    })
                }
            }

            info!(
                object = %artifact.object,
                sequence = artifact.sequence,
                rows = artifact.row_count,
                ?policy,
                path = %destination.path,
                "committed artifact"
            );
            committed.push(destination);
        }

        Ok(committed)
    }

    /// Commit one artifact to `path` under `policy`
    pub async fn commit(
        &self,
        artifact: &StagedArtifact,
        path: &str,
        policy: ConflictPolicy,
    ) -> Result<()> {
        self.write(artifact, path, policy, None).await.map(|_| ())
    }

    /// Write one artifact and return the full object content now in storage.
    /// `known` is the current remote content when the caller already has it.
    async fn write(
        &self,
        artifact: &StagedArtifact,
        path: &str,
        policy: ConflictPolicy,
        known: Option<&Bytes>,
    ) -> Result<Bytes> {
        let local = Bytes::from(tokio::fs::read(&artifact.path).await?);

        let expected = match policy {
            ConflictPolicy::Fail => {
                if self.storage.exists(path).await? {
                    return Err(Error::ObjectExists {
                        path: path.to_string(),
                    });
                }
                local
            }
            ConflictPolicy::Replace => local,
            ConflictPolicy::Append => {
                let existing = match known {
                    Some(content) => Some(content.clone()),
                    None if self.storage.exists(path).await? => {
                        Some(self.storage.get_object(path).await?)
                    }
                    None => None,
                };
                match existing {
                    Some(existing) => {
                        if !header_matches(&existing, &artifact.columns) {
                            warn!(
                                path,
                                object = %artifact.object,
                                sequence = artifact.sequence,
                                "appending rows whose header differs from the existing object"
                            );
                        }
                        append_rows(&existing, &local)
                    }
                    None => local,
                }
            }
        };

        self.storage.put_object(path, expected.clone()).await?;

        if self.verify_uploads {
            let read_back = self.storage.get_object(path).await?;
            if read_back != expected {
                return Err(Error::upload(
                    path,
                    format!(
                        "integrity check failed: wrote {} bytes, read back {}",
                        expected.len(),
                        read_back.len()
                    ),
                ));
            }
        }
        Ok(expected)
    }
}

/// Whether the first line of `existing` names exactly `columns`
fn header_matches(existing: &[u8], columns: &[String]) -> bool {
    if existing.is_empty() {
        return true;
    }
    let (line, _) = split_header(existing);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line);
    match reader.records().next() {
        Some(Ok(header)) => header.iter().eq(columns.iter().map(String::as_str)),
        _ => false,
    }
}

/// Existing content followed by the data rows of `new` (its header dropped)
fn append_rows(existing: &[u8], new: &[u8]) -> Bytes {
    let (_, new_rows) = split_header(new);

    let mut combined = BytesMut::with_capacity(existing.len() + new_rows.len() + 1);
    combined.extend_from_slice(existing);
    if !existing.is_empty() && !existing.ends_with(b"\n") {
        combined.extend_from_slice(b"\n");
    }
    combined.extend_from_slice(new_rows);
    combined.freeze()
}

/// Split CSV bytes after the first line
fn split_header(data: &[u8]) -> (&[u8], &[u8]) {
    match data.iter().position(|&b| b == b'\n') {
        Some(idx) => (&data[..idx], &data[idx + 1..]),
        None => (data, &data[data.len()..]),
    }
}
