/*!
Manifest records describing completed transfers.

Two records are written during a backup run: one [`CollectionManifest`] per
successfully transferred collection, and a single [`BackupSummary`] for the
run as a whole. Both are immutable once written and, together with the
encoded stream files, make a backup directory fully self-contained: restoring
it needs nothing beyond its own files and destination credentials.
*/

use crate::codec::FORMAT_IDENTIFIER;
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the per-collection manifest inside each collection directory.
pub const METADATA_FILE: &str = "metadata.json";

/// File name of the aggregate run summary at the backup root.
pub const SUMMARY_FILE: &str = "backup_summary.json";

/// Name of the encoded stream file for a collection.
pub fn encoded_file_name(collection: &str) -> String {
    format!("{collection}.json")
}

/// Directory name for one backup run: `<database>_<hostToken>_<timestamp>`.
///
/// The timestamp qualifier keeps runs against the same database from
/// colliding on disk.
pub fn backup_dir_name(database: &str, host_token: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        database,
        host_token,
        timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Metadata for one completed collection transfer
///
/// The declared `document_count` is the number of lines actually encoded into
/// the stream file, which can differ from the source's pre-scan count when
/// the collection changes while the cursor is open.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectionManifest {
    /// Name of the collection this manifest describes
    pub collection: String,

    /// Database the collection was read from
    pub database: String,

    /// Number of documents written to the encoded stream file
    pub document_count: u64,

    /// ISO 8601 timestamp when the collection finished streaming
    pub backup_timestamp: DateTime<Utc>,

    /// File name of the encoded stream, relative to the collection directory
    pub json_file: String,

    /// Identifier of the encoding format
    pub format: String,
}

impl CollectionManifest {
    /// Create a manifest for a collection that has finished streaming
    pub fn new<S1, S2>(collection: S1, database: S2, document_count: u64) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let collection = collection.into();
        Self {
            json_file: encoded_file_name(&collection),
            collection,
            database: database.into(),
            document_count,
            backup_timestamp: Utc::now(),
            format: FORMAT_IDENTIFIER.to_string(),
        }
    }

    /// Serialize to the pretty-printed JSON written to `metadata.json`
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a manifest from a collection directory
    pub fn load(collection_dir: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(collection_dir.join(METADATA_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Aggregate record of one backup run
///
/// Written unconditionally after every run, even one where all collections
/// failed, so callers always have a run record. `successful_backups` lists
/// only collections whose stream file and manifest were fully written;
/// collections skipped for being empty are tracked separately and do not
/// count against completeness.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BackupSummary {
    /// ISO 8601 timestamp when the run finished
    pub backup_timestamp: DateTime<Utc>,

    /// Database the collections were read from
    pub database: String,

    /// Host of the source server
    pub host: String,

    /// Port of the source server
    pub port: u16,

    /// Every collection the run attempted, in processing order
    pub collections_attempted: Vec<String>,

    /// Number of collections successfully backed up
    pub collections_backed_up: usize,

    /// Number of collections attempted
    pub total_collections: usize,

    /// Names of the collections that were successfully backed up
    pub successful_backups: Vec<String>,

    /// Names of the collections that failed
    pub failed_backups: Vec<String>,

    /// Names of the collections skipped because they were empty
    pub skipped_collections: Vec<String>,

    /// Root directory the run wrote into
    pub output_directory: String,

    /// Identifier of the encoding format
    pub format: String,
}

impl BackupSummary {
    /// Start a summary for a run over the given collections
    pub fn new<S1, S2>(
        database: S1,
        host: S2,
        port: u16,
        collections_attempted: Vec<String>,
        output_directory: String,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let total_collections = collections_attempted.len();
        Self {
            backup_timestamp: Utc::now(),
            database: database.into(),
            host: host.into(),
            port,
            collections_attempted,
            collections_backed_up: 0,
            total_collections,
            successful_backups: Vec::new(),
            failed_backups: Vec::new(),
            skipped_collections: Vec::new(),
            output_directory,
            format: FORMAT_IDENTIFIER.to_string(),
        }
    }

    /// Record a collection whose stream file and manifest were fully written
    pub fn record_success<S: Into<String>>(&mut self, collection: S) {
        self.successful_backups.push(collection.into());
        self.collections_backed_up += 1;
    }

    /// Record a collection that failed during transfer
    pub fn record_failure<S: Into<String>>(&mut self, collection: S) {
        self.failed_backups.push(collection.into());
    }

    /// Record a collection skipped because it was empty
    pub fn record_skipped<S: Into<String>>(&mut self, collection: S) {
        self.skipped_collections.push(collection.into());
    }

    /// Refresh the timestamp to the moment the run finished
    pub fn mark_finished(&mut self) {
        self.backup_timestamp = Utc::now();
    }

    /// Err([`VaultError::RunIncomplete`]) when any attempted collection failed
    pub fn ensure_complete(&self) -> Result<()> {
        if self.failed_backups.is_empty() {
            Ok(())
        } else {
            Err(VaultError::RunIncomplete {
                succeeded: self.collections_backed_up,
                attempted: self.total_collections,
            })
        }
    }

    /// Serialize to the pretty-printed JSON written to `backup_summary.json`
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a summary from a backup root directory
    pub fn load(backup_root: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(backup_root.join(SUMMARY_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }
}
