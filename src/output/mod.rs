//! Output module
//!
//! Handles the local and remote side of a run.
//!
//! # Overview
//!
//! This module provides:
//! - CSV materialization of pages into staged artifacts
//! - Remote path naming (`client/source/yyyy-mm-dd_HH/name.csv`)
//! - Cloud storage access (GCS, S3, R2, Azure, local)
//! - The upload committer with its conflict policies

mod cloud;
mod commit;
mod path;
mod writer;

pub use cloud::{CloudStore, ObjectStorage};
pub use commit::UploadCommitter;
pub use path::{resolve, DatePrefix, RemoteDestination, DATE_PREFIX_FORMAT};
pub use writer::{BatchMaterializer, StagedArtifact, StagedArtifacts};

#[cfg(test)]
mod tests;
