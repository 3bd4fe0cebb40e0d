//! Tests for output module

use super::*;
use crate::config::SourceDescriptor;
use crate::error::{Error, Result};
use crate::pagination::Page;
use crate::types::{ConflictPolicy, Record};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::TimeZone;
use object_store::memory::InMemory;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use test_case::test_case;

// ============================================================================
// Helpers
// ============================================================================

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn page(records: Vec<serde_json::Value>) -> Page {
    Page::new(records.into_iter().map(record).collect(), None)
}

fn descriptor() -> SourceDescriptor {
    serde_json::from_value(json!({
        "name": "hubspot",
        "source_type": "hubspot",
        "start_time": "2024-01-01T00:00:00Z",
        "end_time": "2025-01-01T00:00:00Z",
        "source_config": { "api_key": "k", "objects": { "contacts": {} } }
    }))
    .unwrap()
}

fn memory_store() -> CloudStore {
    CloudStore::new(Arc::new(InMemory::new()), "acme-landing")
}

fn prefix() -> DatePrefix {
    DatePrefix::parse("2024-01-01_09").unwrap()
}

async fn remote_text(store: &CloudStore, path: &str) -> String {
    String::from_utf8(store.get_object(path).await.unwrap().to_vec()).unwrap()
}

fn stage(dir: &Path, object: &str, sequence: usize, rows: Vec<serde_json::Value>) -> StagedArtifact {
    BatchMaterializer::new(dir, "hubspot")
        .materialize(&page(rows), object, sequence)
        .unwrap()
        .unwrap()
}

/// Storage whose n-th put (1-based) fails
struct FailingPut {
    inner: CloudStore,
    fail_on: usize,
    puts: AtomicUsize,
}

#[async_trait]
impl ObjectStorage for FailingPut {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn put_object(&self, path: &str, data: Bytes) -> Result<()> {
        if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(Error::upload(path, "permission denied"));
        }
        self.inner.put_object(path, data).await
    }

    async fn get_object(&self, path: &str) -> Result<Bytes> {
        self.inner.get_object(path).await
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        self.inner.delete_object(path).await
    }
}

/// Storage that silently truncates what it stores
struct Truncating {
    inner: CloudStore,
}

#[async_trait]
impl ObjectStorage for Truncating {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn put_object(&self, path: &str, data: Bytes) -> Result<()> {
        self.inner.put_object(path, data.slice(..data.len() / 2)).await
    }

    async fn get_object(&self, path: &str) -> Result<Bytes> {
        self.inner.get_object(path).await
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        self.inner.delete_object(path).await
    }
}

/// Storage that counts downloads
struct CountingGets {
    inner: CloudStore,
    gets: AtomicUsize,
}

#[async_trait]
impl ObjectStorage for CountingGets {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn put_object(&self, path: &str, data: Bytes) -> Result<()> {
        self.inner.put_object(path, data).await
    }

    async fn get_object(&self, path: &str) -> Result<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_object(path).await
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        self.inner.delete_object(path).await
    }
}

// ============================================================================
// Materializer Tests
// ============================================================================

#[test]
fn test_materialize_writes_sorted_union_of_columns() {
    let dir = tempdir().unwrap();
    let staging = dir.path().join("temp");
    let materializer = BatchMaterializer::new(&staging, "hubspot");

    let artifact = materializer
        .materialize(
            &page(vec![
                json!({"email": "a@x.io", "firstname": "Ann", "score": 7}),
                json!({"email": "b@x.io", "active": true, "tags": ["x", "y"], "firstname": null}),
            ]),
            "contacts",
            0,
        )
        .unwrap()
        .unwrap();

    assert_eq!(
        artifact.columns,
        vec!["active", "email", "firstname", "score", "tags"]
    );
    assert_eq!(artifact.row_count, 2);
    assert_eq!(artifact.sequence, 0);
    assert_eq!(artifact.path, staging.join("hubspot_contacts_batch_0.csv"));

    let text = std::fs::read_to_string(&artifact.path).unwrap();
    assert_eq!(
        text,
        "active,email,firstname,score,tags\n\
         ,a@x.io,Ann,7,\n\
         true,b@x.io,,,\"[\"\"x\"\",\"\"y\"\"]\"\n"
    );
}

#[test]
fn test_materialize_empty_page_stages_nothing() {
    let dir = tempdir().unwrap();
    let staging = dir.path().join("never-created");
    let materializer = BatchMaterializer::new(&staging, "hubspot");

    assert!(materializer.materialize(&Page::end(), "deals", 3).unwrap().is_none());
    assert!(!staging.exists());
}

#[test]
fn test_file_name_replaces_separators() {
    let materializer = BatchMaterializer::new("temp", "qb");
    assert_eq!(materializer.file_name("dbo/Customers", 2), "qb_dbo_Customers_batch_2.csv");
}

#[test]
fn test_staged_artifacts_deleted_on_drop() {
    let dir = tempdir().unwrap();
    let first = stage(dir.path(), "contacts", 0, vec![json!({"a": 1})]);
    let second = stage(dir.path(), "contacts", 1, vec![json!({"a": 2})]);
    let paths = [first.path.clone(), second.path.clone()];

    {
        let mut staged = StagedArtifacts::new();
        staged.push(first);
        staged.push(second);
        assert_eq!(staged.total_rows(), 2);
        assert!(paths.iter().all(|p| p.exists()));
    }

    assert!(paths.iter().all(|p| !p.exists()));
}

#[test]
fn test_cleanup_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut staged = StagedArtifacts::new();
    staged.push(stage(dir.path(), "deals", 0, vec![json!({"a": 1})]));

    assert_eq!(staged.cleanup(), 1);
    assert_eq!(staged.cleanup(), 0);
    assert!(staged.is_empty());
}

// ============================================================================
// Path Tests
// ============================================================================

#[test]
fn test_resolve() {
    assert_eq!(
        resolve("acme", "hubspot", "2024-01-01_09", "contacts"),
        "acme/hubspot/2024-01-01_09/contacts.csv"
    );
}

#[test]
fn test_date_prefix_at() {
    let instant = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
    assert_eq!(DatePrefix::at(instant).as_str(), "2024-01-01_09");
    assert_eq!(DatePrefix::now().as_str().len(), 13);
}

#[test_case("2024-01-01_09", true)]
#[test_case("2024-12-31_23", true)]
#[test_case("2024-01-01_24", false)]
#[test_case("2024-13-01_00", false)]
#[test_case("2024-01-01", false)]
#[test_case("2024-01-01T09", false)]
fn test_date_prefix_parse(value: &str, valid: bool) {
    assert_eq!(DatePrefix::parse(value).is_ok(), valid);
}

#[test]
fn test_remote_destination_display() {
    let dest = RemoteDestination {
        bucket: "acme-landing".to_string(),
        path: "acme/hubspot/2024-01-01_09/contacts.csv".to_string(),
    };
    assert_eq!(
        dest.to_string(),
        "acme-landing/acme/hubspot/2024-01-01_09/contacts.csv"
    );
}

// ============================================================================
// Storage Tests
// ============================================================================

#[tokio::test]
async fn test_memory_store_round_trip() {
    let store = memory_store();
    assert!(!store.exists("a/b.csv").await.unwrap());

    store.put_object("a/b.csv", Bytes::from_static(b"x\n1\n")).await.unwrap();
    assert!(store.exists("a/b.csv").await.unwrap());
    assert_eq!(remote_text(&store, "a/b.csv").await, "x\n1\n");

    store.delete_object("a/b.csv").await.unwrap();
    assert!(!store.exists("a/b.csv").await.unwrap());
}

#[tokio::test]
async fn test_local_store() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("bucket");
    let store = CloudStore::parse(root.to_str().unwrap(), None).unwrap();
    assert_eq!(store.scheme(), "file");

    store.put_object("acme/x.csv", Bytes::from_static(b"h\n")).await.unwrap();
    assert!(root.join("acme/x.csv").exists());
}

// ============================================================================
// Committer Tests
// ============================================================================

#[tokio::test]
async fn test_commit_all_replaces_then_appends() {
    let dir = tempdir().unwrap();
    let store = memory_store();
    let artifacts = vec![
        stage(dir.path(), "contacts", 0, vec![json!({"email": "a"})]),
        stage(dir.path(), "contacts", 1, vec![json!({"email": "b"})]),
        stage(dir.path(), "deals", 0, vec![json!({"amount": 5})]),
    ];

    let committed = UploadCommitter::new(&store, "acme")
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap();

    let paths: Vec<&str> = committed.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "acme/hubspot/2024-01-01_09/contacts.csv",
            "acme/hubspot/2024-01-01_09/contacts.csv",
            "acme/hubspot/2024-01-01_09/deals.csv",
        ]
    );
    assert_eq!(
        remote_text(&store, "acme/hubspot/2024-01-01_09/contacts.csv").await,
        "email\na\nb\n"
    );
    assert_eq!(
        remote_text(&store, "acme/hubspot/2024-01-01_09/deals.csv").await,
        "amount\n5\n"
    );
}

#[test_case(false, 0 ; "without verification")]
#[test_case(true, 3 ; "with verification")]
#[tokio::test]
async fn test_later_batches_do_not_download_the_object(verify: bool, expected_gets: usize) {
    let dir = tempdir().unwrap();
    let storage = CountingGets {
        inner: memory_store(),
        gets: AtomicUsize::new(0),
    };
    let artifacts = vec![
        stage(dir.path(), "contacts", 0, vec![json!({"email": "a"})]),
        stage(dir.path(), "contacts", 1, vec![json!({"email": "b"})]),
        stage(dir.path(), "contacts", 2, vec![json!({"email": "c"})]),
    ];

    UploadCommitter::new(&storage, "acme")
        .with_verify(verify)
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap();

    assert_eq!(storage.gets.load(Ordering::SeqCst), expected_gets);
    assert_eq!(
        remote_text(&storage.inner, "acme/hubspot/2024-01-01_09/contacts.csv").await,
        "email\na\nb\nc\n"
    );
}

#[tokio::test]
async fn test_append_with_drifting_header_keeps_rows() {
    let dir = tempdir().unwrap();
    let store = memory_store();
    let artifacts = vec![
        stage(dir.path(), "contacts", 0, vec![json!({"email": "a"})]),
        stage(dir.path(), "contacts", 1, vec![json!({"email": "b", "phone": "1"})]),
    ];

    UploadCommitter::new(&store, "acme")
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap();

    assert_eq!(
        remote_text(&store, "acme/hubspot/2024-01-01_09/contacts.csv").await,
        "email\na\nb,1\n"
    );
}

#[tokio::test]
async fn test_destination() {
    let store = memory_store();
    let destination =
        UploadCommitter::new(&store, "acme").destination(&descriptor(), &prefix(), "deals");
    assert_eq!(
        destination.to_string(),
        "acme-landing/acme/hubspot/2024-01-01_09/deals.csv"
    );
}

#[tokio::test]
async fn test_rerun_within_hour_overwrites() {
    let dir = tempdir().unwrap();
    let store = memory_store();
    let committer = UploadCommitter::new(&store, "acme");

    for _ in 0..2 {
        let artifacts = vec![stage(dir.path(), "contacts", 0, vec![json!({"email": "a"})])];
        committer
            .commit_all(&artifacts, &descriptor(), &prefix())
            .await
            .unwrap();
    }

    assert_eq!(
        remote_text(&store, "acme/hubspot/2024-01-01_09/contacts.csv").await,
        "email\na\n"
    );
}

#[tokio::test]
async fn test_fail_policy_rejects_existing_object() {
    let dir = tempdir().unwrap();
    let store = memory_store();
    store
        .put_object("acme/hubspot/2024-01-01_09/contacts.csv", Bytes::from_static(b"old\n"))
        .await
        .unwrap();

    let artifacts = vec![stage(dir.path(), "contacts", 0, vec![json!({"email": "a"})])];
    let err = UploadCommitter::new(&store, "acme")
        .with_policy(ConflictPolicy::Fail)
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap_err();

    match err {
        Error::PartialUpload { committed, total, source } => {
            assert_eq!((committed, total), (0, 1));
            assert!(matches!(*source, Error::ObjectExists { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        remote_text(&store, "acme/hubspot/2024-01-01_09/contacts.csv").await,
        "old\n"
    );
}

#[tokio::test]
async fn test_append_policy_keeps_existing_rows() {
    let dir = tempdir().unwrap();
    let store = memory_store();
    store
        .put_object(
            "acme/hubspot/2024-01-01_09/contacts.csv",
            Bytes::from_static(b"email\nold\n"),
        )
        .await
        .unwrap();

    let artifacts = vec![stage(dir.path(), "contacts", 0, vec![json!({"email": "new"})])];
    UploadCommitter::new(&store, "acme")
        .with_policy(ConflictPolicy::Append)
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap();

    assert_eq!(
        remote_text(&store, "acme/hubspot/2024-01-01_09/contacts.csv").await,
        "email\nold\nnew\n"
    );
}

#[tokio::test]
async fn test_second_upload_failure_aborts_rest() {
    let dir = tempdir().unwrap();
    let storage = FailingPut {
        inner: memory_store(),
        fail_on: 2,
        puts: AtomicUsize::new(0),
    };
    let artifacts = vec![
        stage(dir.path(), "contacts", 0, vec![json!({"email": "a"})]),
        stage(dir.path(), "deals", 0, vec![json!({"amount": 1})]),
        stage(dir.path(), "tickets", 0, vec![json!({"subject": "s"})]),
    ];

    let err = UploadCommitter::new(&storage, "acme")
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PartialUpload { committed: 1, total: 3, .. }));
    assert_eq!(storage.puts.load(Ordering::SeqCst), 2);
    assert!(storage.inner.exists("acme/hubspot/2024-01-01_09/contacts.csv").await.unwrap());
    assert!(!storage.inner.exists("acme/hubspot/2024-01-01_09/tickets.csv").await.unwrap());
}

#[tokio::test]
async fn test_integrity_check_detects_truncation() {
    let dir = tempdir().unwrap();
    let storage = Truncating { inner: memory_store() };
    let artifacts = vec![stage(dir.path(), "contacts", 0, vec![json!({"email": "a@x.io"})])];

    let err = UploadCommitter::new(&storage, "acme")
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap_err();
    match err {
        Error::PartialUpload { committed: 0, total: 1, source } => {
            assert!(source.to_string().contains("integrity check failed"));
        }
        other => panic!("unexpected error: {other}"),
    }

    UploadCommitter::new(&storage, "acme")
        .with_verify(false)
        .commit_all(&artifacts, &descriptor(), &prefix())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_validate_access() {
    let store = memory_store();
    UploadCommitter::new(&store, "acme").validate_access().await.unwrap();

    let failing = FailingPut {
        inner: memory_store(),
        fail_on: 1,
        puts: AtomicUsize::new(0),
    };
    let err = UploadCommitter::new(&failing, "acme")
        .validate_access()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
}
