//! Tests for engine module

use super::*;
use crate::config::SourceDescriptor;
use crate::output::CloudStore;
use crate::pagination::{Cursor, Page};
use crate::types::{ConflictPolicy, Record};
use async_trait::async_trait;
use chrono::TimeZone;
use object_store::memory::InMemory;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use test_case::test_case;

// ============================================================================
// Mock Source
// ============================================================================

/// Source serving scripted pages; cursors are page indexes
struct ScriptedSource {
    descriptor: SourceDescriptor,
    pages: Vec<(String, Vec<Vec<Record>>)>,
    fail_on_call: Option<usize>,
    repeat_cursor: bool,
    calls: Vec<(String, Option<Cursor>)>,
}

impl ScriptedSource {
    fn new(pages: Vec<(&str, Vec<Vec<Record>>)>) -> Self {
        Self {
            descriptor: descriptor(),
            pages: pages
                .into_iter()
                .map(|(object, pages)| (object.to_string(), pages))
                .collect(),
            fail_on_call: None,
            repeat_cursor: false,
            calls: Vec::new(),
        }
    }

    fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn objects(&self) -> Vec<String> {
        self.pages.iter().map(|(object, _)| object.clone()).collect()
    }

    async fn fetch_page(
        &mut self,
        object: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> crate::Result<Page> {
        assert_eq!(limit, 2);
        self.calls.push((object.to_string(), cursor.cloned()));
        if self.fail_on_call == Some(self.calls.len()) {
            return Err(Error::fetch(object, Error::http_status(500, "boom")));
        }

        let pages = &self
            .pages
            .iter()
            .find(|(name, _)| name == object)
            .unwrap()
            .1;
        let index: usize = cursor
            .and_then(Cursor::as_token)
            .map_or(0, |t| t.parse().unwrap());
        let records = pages.get(index).cloned().unwrap_or_default();

        let next = if self.repeat_cursor {
            Some(Cursor::Token("0".to_string()))
        } else if index + 1 < pages.len() {
            Some(Cursor::Token((index + 1).to_string()))
        } else {
            None
        };
        Ok(Page::new(records, next))
    }
}

fn descriptor() -> SourceDescriptor {
    serde_json::from_value(json!({
        "name": "hubspot",
        "source_type": "hubspot",
        "batch_size": 2,
        "start_time": "2024-01-01T00:00:00Z",
        "end_time": "2025-01-01T00:00:00Z",
        "source_config": {
            "api_key": "k",
            "objects": { "contacts": {}, "deals": {} }
        }
    }))
    .unwrap()
}

fn rows(ids: &[i64]) -> Vec<Record> {
    ids.iter()
        .map(|id| json!({ "id": id }).as_object().cloned().unwrap())
        .collect()
}

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| entries.count())
}

fn two_objects() -> ScriptedSource {
    ScriptedSource::new(vec![
        ("contacts", vec![rows(&[1, 2]), rows(&[3])]),
        ("deals", vec![rows(&[10])]),
    ])
}

// ============================================================================
// Extraction Tests
// ============================================================================

#[tokio::test]
async fn test_extraction_yields_objects_in_order() {
    let dir = tempdir().unwrap();
    let materializer = BatchMaterializer::new(dir.path(), "hubspot");
    let mut source = two_objects();

    let mut extraction =
        Extraction::new(&mut source, &materializer, utc(2024, 1, 1), utc(2024, 2, 1)).unwrap();
    assert_eq!(extraction.objects(), ["contacts", "deals"]);

    let mut staged = Vec::new();
    while let Some(artifact) = extraction.next().await {
        let artifact = artifact.unwrap();
        staged.push((artifact.object.clone(), artifact.sequence, artifact.row_count));
    }
    assert!(extraction.is_finished());
    assert!(extraction.next().await.is_none());

    assert_eq!(
        staged,
        vec![
            ("contacts".to_string(), 0, 2),
            ("contacts".to_string(), 1, 1),
            ("deals".to_string(), 0, 1),
        ]
    );
    assert_eq!(
        source.calls,
        vec![
            ("contacts".to_string(), None),
            ("contacts".to_string(), Some(Cursor::Token("1".to_string()))),
            ("deals".to_string(), None),
        ]
    );
}

#[test_case(utc(2024, 2, 1), utc(2024, 1, 1) ; "inverted window")]
#[test_case(utc(2024, 1, 1), utc(2024, 1, 1) ; "empty window")]
#[test_case(utc(2023, 12, 1), utc(2024, 1, 2) ; "starts before source")]
#[test_case(utc(2024, 6, 1), utc(2025, 6, 1) ; "ends after source")]
#[tokio::test]
async fn test_invalid_window_makes_no_calls(start: DateTime<Utc>, end: DateTime<Utc>) {
    let dir = tempdir().unwrap();
    let materializer = BatchMaterializer::new(dir.path(), "hubspot");
    let mut source = two_objects();

    let err = Extraction::new(&mut source, &materializer, start, end)
        .err()
        .unwrap();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(source.calls.is_empty());
}

#[tokio::test]
async fn test_empty_object_stages_nothing() {
    let dir = tempdir().unwrap();
    let materializer = BatchMaterializer::new(dir.path(), "hubspot");
    let mut source = ScriptedSource::new(vec![("contacts", vec![]), ("deals", vec![rows(&[1])])]);

    let mut extraction =
        Extraction::new(&mut source, &materializer, utc(2024, 1, 1), utc(2024, 2, 1)).unwrap();
    let first = extraction.next().await.unwrap().unwrap();
    assert_eq!(first.object, "deals");
    assert!(extraction.next().await.is_none());
    assert_eq!(source.calls.len(), 2);
}

#[tokio::test]
async fn test_fetch_failure_ends_sequence() {
    let dir = tempdir().unwrap();
    let materializer = BatchMaterializer::new(dir.path(), "hubspot");
    let mut source = two_objects().failing_on(2);

    let mut extraction =
        Extraction::new(&mut source, &materializer, utc(2024, 1, 1), utc(2024, 2, 1)).unwrap();
    assert!(extraction.next().await.unwrap().is_ok());
    let err = extraction.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Fetch { .. }));
    assert!(extraction.next().await.is_none());
    assert_eq!(source.calls.len(), 2);
}

#[tokio::test]
async fn test_repeated_cursor_is_an_error() {
    let dir = tempdir().unwrap();
    let materializer = BatchMaterializer::new(dir.path(), "hubspot");
    let mut source = two_objects();
    source.repeat_cursor = true;

    let mut extraction =
        Extraction::new(&mut source, &materializer, utc(2024, 1, 1), utc(2024, 2, 1)).unwrap();
    assert!(extraction.next().await.unwrap().is_ok());
    let err = extraction.next().await.unwrap().unwrap_err();
    assert!(
        matches!(err, Error::Fetch { ref source, .. } if source.to_string().contains("cursor did not advance"))
    );
    assert!(extraction.next().await.is_none());
}

// ============================================================================
// RunConfig Tests
// ============================================================================

#[test]
fn test_run_config_default() {
    let config = RunConfig::default();
    assert_eq!(config.policy, ConflictPolicy::Replace);
    assert!(config.verify_uploads);
    assert!(!config.validate_storage);
    assert!(config.date_prefix.is_none());
}

#[test]
fn test_run_config_builder() {
    let config = RunConfig::new()
        .with_policy(ConflictPolicy::Fail)
        .with_verify_uploads(false)
        .with_validate_storage(true)
        .with_date_prefix(DatePrefix::parse("2024-01-01_09").unwrap());

    assert_eq!(config.policy, ConflictPolicy::Fail);
    assert!(!config.verify_uploads);
    assert!(config.validate_storage);
    assert_eq!(config.date_prefix.unwrap().as_str(), "2024-01-01_09");
}

// ============================================================================
// RunEngine Tests
// ============================================================================

fn run_config() -> RunConfig {
    RunConfig::new()
        .with_validate_storage(true)
        .with_date_prefix(DatePrefix::parse("2024-01-01_09").unwrap())
}

#[tokio::test]
async fn test_run_uploads_and_cleans_up() {
    let dir = tempdir().unwrap();
    let store = CloudStore::new(Arc::new(InMemory::new()), "acme-landing");
    let mut source = two_objects();

    let mut engine = RunEngine::new(&store, "acme", dir.path()).with_config(run_config());
    let destinations = engine
        .run(&mut source, utc(2024, 1, 1), utc(2024, 2, 1))
        .await
        .unwrap();

    assert_eq!(destinations.len(), 3);
    assert_eq!(
        destinations[2].to_string(),
        "acme-landing/acme/hubspot/2024-01-01_09/deals.csv"
    );
    let contacts = store
        .get_object("acme/hubspot/2024-01-01_09/contacts.csv")
        .await
        .unwrap();
    assert_eq!(&contacts[..], b"id\n1\n2\n3\n");

    let report = engine.report();
    assert_eq!(
        report.phases,
        vec![
            RunPhase::Init,
            RunPhase::ValidatingWindow,
            RunPhase::Extracting,
            RunPhase::Extracted,
            RunPhase::Uploading,
            RunPhase::CleaningUp,
            RunPhase::Done,
        ]
    );
    assert!(report.succeeded());
    assert_eq!(report.artifacts_staged, 3);
    assert_eq!(report.rows_staged, 4);
    assert_eq!(report.artifacts_committed, 3);
    assert_eq!(report.artifacts_removed, 3);
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn test_run_extraction_failure_uploads_nothing() {
    let dir = tempdir().unwrap();
    let store = CloudStore::new(Arc::new(InMemory::new()), "acme-landing");
    let mut source = two_objects().failing_on(3);

    let mut engine = RunEngine::new(&store, "acme", dir.path()).with_config(run_config());
    let err = engine
        .run(&mut source, utc(2024, 1, 1), utc(2024, 2, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Fetch { .. }));
    assert_eq!(
        engine.report().phases,
        vec![
            RunPhase::Init,
            RunPhase::ValidatingWindow,
            RunPhase::Extracting,
            RunPhase::Failed,
            RunPhase::CleaningUp,
        ]
    );
    assert_eq!(engine.report().artifacts_removed, 2);
    assert_eq!(staged_files(dir.path()), 0);
    assert!(!store
        .exists("acme/hubspot/2024-01-01_09/contacts.csv")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_run_invalid_window() {
    let dir = tempdir().unwrap();
    let store = CloudStore::new(Arc::new(InMemory::new()), "acme-landing");
    let mut source = two_objects();

    let mut engine = RunEngine::new(&store, "acme", dir.path());
    let err = engine
        .run(&mut source, utc(2026, 1, 1), utc(2026, 2, 1))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(source.calls.is_empty());
    assert_eq!(engine.report().phase(), RunPhase::CleaningUp);
    assert!(engine.report().phases.contains(&RunPhase::Failed));
}

#[tokio::test]
async fn test_run_fail_policy_reports_partial_upload() {
    let dir = tempdir().unwrap();
    let store = CloudStore::new(Arc::new(InMemory::new()), "acme-landing");
    store
        .put_object(
            "acme/hubspot/2024-01-01_09/deals.csv",
            bytes::Bytes::from_static(b"id\n9\n"),
        )
        .await
        .unwrap();
    let mut source = two_objects();

    let mut engine = RunEngine::new(&store, "acme", dir.path())
        .with_config(run_config().with_policy(ConflictPolicy::Fail));
    let err = engine
        .run(&mut source, utc(2024, 1, 1), utc(2024, 2, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PartialUpload { committed: 2, total: 3, .. }));
    assert_eq!(engine.report().artifacts_committed, 2);
    let paths: Vec<String> = engine
        .report()
        .destinations
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        paths,
        vec!["acme-landing/acme/hubspot/2024-01-01_09/contacts.csv"; 2]
    );
    assert_eq!(staged_files(dir.path()), 0);
}
