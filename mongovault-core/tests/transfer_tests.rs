/*!
End-to-end tests for the backup/restore transfer engines.

Everything runs against the in-memory gateway and a temp directory; no live
server is needed to exercise the engine contracts.
*/

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{doc, Binary, DateTime, Document};
use mongovault_core::manifest::{CollectionManifest, SUMMARY_FILE};
use mongovault_core::{
    discover_collections, BackupEngine, BackupSummary, ConnectionConfig, MemoryStore,
    RestoreEngine, RestoreOptions,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn source_config() -> ConnectionConfig {
    ConnectionConfig::new("10.8.0.2").with_port(27017)
}

fn order_documents(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            doc! {
                "_id": ObjectId::new(),
                "seq": i as i64,
                "placed_at": DateTime::from_millis(1_700_000_000_000 + i as i64),
                "total": 19.99,
            }
        })
        .collect()
}

/// The single run directory a backup created under `output_root`
fn run_dir(output_root: &Path) -> PathBuf {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(output_root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert_eq!(dirs.len(), 1, "expected exactly one run directory");
    dirs.pop().unwrap()
}

#[tokio::test]
async fn test_backup_restore_round_trip_preserves_extended_types() {
    let source = MemoryStore::new();
    let documents = vec![doc! {
        "_id": ObjectId::new(),
        "created": DateTime::from_millis(1_699_999_999_123),
        "count": 9_007_199_254_740_993_i64,
        "ratio": 0.25,
        "blob": Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3, 255] },
        "tags": ["a", "b"],
        "nested": doc! { "flag": true, "note": bson::Bson::Null },
    }];
    source.insert_fixture("shop", "events", documents.clone());

    let output = TempDir::new().unwrap();
    let summary = BackupEngine::new(source, source_config())
        .backup("shop", &["events".to_string()], output.path())
        .await
        .unwrap();
    assert_eq!(summary.successful_backups, vec!["events"]);

    let destination = MemoryStore::new();
    let report = RestoreEngine::new(destination.clone())
        .restore("shop", &run_dir(output.path()), &RestoreOptions::default())
        .await
        .unwrap();
    assert!(report.all_succeeded());

    // Structural equality, extended-type identity included
    assert_eq!(destination.documents("shop", "events"), documents);
}

#[tokio::test]
async fn test_partial_failure_isolation() {
    let source = MemoryStore::new();
    source.insert_fixture("shop", "alpha", order_documents(3));
    source.insert_fixture("shop", "beta", order_documents(5));
    source.insert_fixture("shop", "gamma", order_documents(2));
    // beta's cursor dies mid-stream
    source.fail_cursor("shop", "beta", 2);

    let output = TempDir::new().unwrap();
    let collections: Vec<String> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let summary = BackupEngine::new(source, source_config())
        .backup("shop", &collections, output.path())
        .await
        .unwrap();

    assert_eq!(summary.collections_backed_up, 2);
    assert_eq!(summary.total_collections, 3);
    assert_eq!(summary.successful_backups, vec!["alpha", "gamma"]);
    assert_eq!(summary.failed_backups, vec!["beta"]);
    assert!(summary.ensure_complete().is_err());

    // Files for the collection after the failure are still produced
    let run = run_dir(output.path());
    assert!(run.join("gamma").join("gamma.json").is_file());
    assert!(run.join("gamma").join("metadata.json").is_file());

    // The summary is on disk even for a partially failed run
    let loaded = BackupSummary::load(&run).unwrap();
    assert_eq!(loaded.failed_backups, vec!["beta"]);
}

#[tokio::test]
async fn test_empty_collection_is_skipped_not_failed() {
    let source = MemoryStore::new();
    source.insert_fixture("shop", "filled", order_documents(4));
    source.insert_fixture("shop", "hollow", Vec::new());

    let output = TempDir::new().unwrap();
    let collections: Vec<String> = ["filled", "hollow"].iter().map(|s| s.to_string()).collect();
    let summary = BackupEngine::new(source, source_config())
        .backup("shop", &collections, output.path())
        .await
        .unwrap();

    assert_eq!(summary.successful_backups, vec!["filled"]);
    assert_eq!(summary.skipped_collections, vec!["hollow"]);
    assert!(summary.failed_backups.is_empty());
    // A skip is not a failure
    assert!(summary.ensure_complete().is_ok());

    // No subdirectory, no manifest for the empty collection
    assert!(!run_dir(output.path()).join("hollow").exists());
}

#[tokio::test]
async fn test_manifest_records_streamed_count_and_format() {
    let source = MemoryStore::new();
    source.insert_fixture("shop", "orders", order_documents(7));

    let output = TempDir::new().unwrap();
    BackupEngine::new(source, source_config())
        .backup("shop", &["orders".to_string()], output.path())
        .await
        .unwrap();

    let run = run_dir(output.path());
    let manifest = CollectionManifest::load(&run.join("orders")).unwrap();
    assert_eq!(manifest.collection, "orders");
    assert_eq!(manifest.database, "shop");
    assert_eq!(manifest.document_count, 7);
    assert_eq!(manifest.json_file, "orders.json");
    assert_eq!(manifest.format, mongovault_core::FORMAT_IDENTIFIER);

    let stream = std::fs::read_to_string(run.join("orders").join("orders.json")).unwrap();
    assert_eq!(stream.lines().count(), 7);
    assert!(run.join(SUMMARY_FILE).is_file());
}

#[tokio::test]
async fn test_batch_boundaries_on_restore() {
    let source = MemoryStore::new();
    source.insert_fixture("shop", "orders", order_documents(2500));

    let output = TempDir::new().unwrap();
    BackupEngine::new(source, source_config())
        .backup("shop", &["orders".to_string()], output.path())
        .await
        .unwrap();

    let destination = MemoryStore::new();
    let report = RestoreEngine::new(destination.clone())
        .restore("shop", &run_dir(output.path()), &RestoreOptions::default())
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.outcome("orders").unwrap().documents_inserted, 2500);
    assert_eq!(destination.documents("shop", "orders").len(), 2500);
    // Exactly three bulk inserts: 1000, 1000, 500
    assert_eq!(
        destination.insert_batches(),
        vec![
            ("orders".to_string(), 1000),
            ("orders".to_string(), 1000),
            ("orders".to_string(), 500),
        ]
    );
}

#[tokio::test]
async fn test_malformed_lines_are_skipped_not_fatal() {
    // Hand-build a backup directory: 10 valid lines and 1 corrupted one
    let backup_root = TempDir::new().unwrap();
    let collection_dir = backup_root.path().join("orders");
    std::fs::create_dir_all(&collection_dir).unwrap();

    let mut lines: Vec<String> = order_documents(10)
        .iter()
        .map(|d| mongovault_core::codec::encode(d).unwrap())
        .collect();
    lines.insert(4, "{ this is not valid json".to_string());
    std::fs::write(collection_dir.join("orders.json"), lines.join("\n")).unwrap();

    let destination = MemoryStore::new();
    let report = RestoreEngine::new(destination.clone())
        .restore("shop", backup_root.path(), &RestoreOptions::default())
        .await
        .unwrap();

    assert!(report.all_succeeded());
    let outcome = report.outcome("orders").unwrap();
    assert_eq!(outcome.documents_inserted, 10);
    assert_eq!(outcome.malformed_lines, 1);
    assert_eq!(destination.documents("shop", "orders").len(), 10);
}

#[tokio::test]
async fn test_drop_and_restore_is_idempotent() {
    let source = MemoryStore::new();
    source.insert_fixture("shop", "orders", order_documents(12));

    let output = TempDir::new().unwrap();
    BackupEngine::new(source, source_config())
        .backup("shop", &["orders".to_string()], output.path())
        .await
        .unwrap();
    let run = run_dir(output.path());

    let destination = MemoryStore::new();
    let options = RestoreOptions::default().with_drop_existing(true);
    let engine = RestoreEngine::new(destination.clone());

    engine.restore("shop", &run, &options).await.unwrap();
    assert_eq!(destination.documents("shop", "orders").len(), 12);

    engine.restore("shop", &run, &options).await.unwrap();
    assert_eq!(destination.documents("shop", "orders").len(), 12);
}

#[tokio::test]
async fn test_insert_failure_marks_collection_failed_but_run_continues() {
    let source = MemoryStore::new();
    source.insert_fixture("shop", "alpha", order_documents(3));
    source.insert_fixture("shop", "beta", order_documents(3));

    let output = TempDir::new().unwrap();
    let collections: Vec<String> = ["alpha", "beta"].iter().map(|s| s.to_string()).collect();
    BackupEngine::new(source, source_config())
        .backup("shop", &collections, output.path())
        .await
        .unwrap();

    let destination = MemoryStore::new();
    destination.fail_inserts("shop", "alpha");
    let report = RestoreEngine::new(destination.clone())
        .restore("shop", &run_dir(output.path()), &RestoreOptions::default())
        .await
        .unwrap();

    assert_eq!(report.failed(), vec!["alpha"]);
    assert_eq!(report.succeeded(), vec!["beta"]);
    assert_eq!(destination.documents("shop", "beta").len(), 3);
    assert!(report.ensure_complete().is_err());
}

#[tokio::test]
async fn test_requested_collection_without_backup_file_is_marked_failed() {
    let source = MemoryStore::new();
    source.insert_fixture("shop", "orders", order_documents(2));

    let output = TempDir::new().unwrap();
    BackupEngine::new(source, source_config())
        .backup("shop", &["orders".to_string()], output.path())
        .await
        .unwrap();

    let destination = MemoryStore::new();
    let options = RestoreOptions::default()
        .with_collections(vec!["orders".to_string(), "phantom".to_string()]);
    let report = RestoreEngine::new(destination)
        .restore("shop", &run_dir(output.path()), &options)
        .await
        .unwrap();

    assert_eq!(report.succeeded(), vec!["orders"]);
    assert_eq!(report.failed(), vec!["phantom"]);
}

#[tokio::test]
async fn test_discovery_ignores_directories_without_stream_file() {
    let backup_root = TempDir::new().unwrap();
    let orders = backup_root.path().join("orders");
    std::fs::create_dir_all(&orders).unwrap();
    std::fs::write(orders.join("orders.json"), "").unwrap();
    // A directory without a matching stream file is not restorable
    std::fs::create_dir_all(backup_root.path().join("stray")).unwrap();

    let discovered = discover_collections(backup_root.path()).unwrap();
    assert_eq!(discovered, vec!["orders"]);
}

#[tokio::test]
async fn test_restore_of_empty_backup_dir_is_an_error() {
    let backup_root = TempDir::new().unwrap();
    let destination = MemoryStore::new();
    let result = RestoreEngine::new(destination)
        .restore("shop", backup_root.path(), &RestoreOptions::default())
        .await;
    assert!(result.is_err());
}
