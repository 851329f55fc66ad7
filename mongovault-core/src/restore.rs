/*!
Restore engine: re-inserts backed-up collections into a destination session.

Collections are discovered by scanning the backup directory (or taken from an
explicit selection), read line by line, decoded, and inserted in bounded
batches. A line that fails to decode is logged and skipped; a bulk insert
that fails marks its whole collection failed; neither aborts the remaining
collections. The run always ends with a [`RestoreReport`] naming every
attempted collection's outcome.
*/

use crate::codec;
use crate::config::DEFAULT_COUNT_TIME_BUDGET;
use crate::gateway::DocumentStore;
use crate::manifest::encoded_file_name;
use crate::progress::{null_sink, ProgressEvent, SharedSink};
use crate::{Result, VaultError};
use bson::Document;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Number of documents inserted per bulk write unless overridden
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Options controlling one restore run
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Collections to restore; `None` restores everything discovered in the
    /// backup directory
    pub collections: Option<Vec<String>>,
    /// Drop each destination collection before inserting
    pub drop_existing: bool,
    /// Bulk insert batch size
    pub batch_size: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            collections: None,
            drop_existing: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl RestoreOptions {
    /// Restore only the named collections
    pub fn with_collections(mut self, collections: Vec<String>) -> Self {
        self.collections = Some(collections);
        self
    }

    /// Drop destination collections before inserting
    pub fn with_drop_existing(mut self, drop_existing: bool) -> Self {
        self.drop_existing = drop_existing;
        self
    }

    /// Override the bulk insert batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Outcome of restoring one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionOutcome {
    /// Whether the collection restored completely
    pub success: bool,
    /// Documents inserted into the destination
    pub documents_inserted: u64,
    /// Lines skipped because they failed to decode
    pub malformed_lines: u64,
}

/// Per-collection outcomes of one restore run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    outcomes: BTreeMap<String, CollectionOutcome>,
}

impl RestoreReport {
    /// Record the outcome for one collection
    pub fn record<S: Into<String>>(&mut self, collection: S, outcome: CollectionOutcome) {
        self.outcomes.insert(collection.into(), outcome);
    }

    /// Outcome for one collection, if it was attempted
    pub fn outcome(&self, collection: &str) -> Option<&CollectionOutcome> {
        self.outcomes.get(collection)
    }

    /// Names of collections that restored successfully
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of collections that failed
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Number of collections attempted
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when no collection was attempted
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True when every attempted collection succeeded
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(|o| o.success)
    }

    /// Err([`VaultError::RunIncomplete`]) when any collection failed
    pub fn ensure_complete(&self) -> Result<()> {
        if self.all_succeeded() {
            Ok(())
        } else {
            Err(VaultError::RunIncomplete {
                succeeded: self.succeeded().len(),
                attempted: self.len(),
            })
        }
    }
}

/// Find restorable collections in a backup directory
///
/// A collection is restorable when its subdirectory contains the matching
/// `<collection>.json` stream file. Results are sorted for stable
/// processing order.
pub fn discover_collections(backup_root: &Path) -> Result<Vec<String>> {
    let mut collections = Vec::new();
    for entry in std::fs::read_dir(backup_root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.path().join(encoded_file_name(&name)).is_file() {
            collections.push(name);
        }
    }
    collections.sort();
    Ok(collections)
}

/// Engine for restoring collections through a [`DocumentStore`] session
pub struct RestoreEngine<S: DocumentStore> {
    store: S,
    progress: SharedSink,
}

impl<S: DocumentStore> RestoreEngine<S> {
    /// Create an engine over an established destination session
    pub fn new(store: S) -> Self {
        Self {
            store,
            progress: null_sink(),
        }
    }

    /// Attach a progress sink; events are advisory
    pub fn with_progress(mut self, sink: SharedSink) -> Self {
        self.progress = sink;
        self
    }

    /// Access the underlying session
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Restore collections from `backup_root` into `database`
    ///
    /// With no explicit selection, restorable collections are discovered by
    /// scanning the backup directory. A requested collection with no backup
    /// file is logged and marked failed rather than silently skipped.
    pub async fn restore(
        &self,
        database: &str,
        backup_root: &Path,
        options: &RestoreOptions,
    ) -> Result<RestoreReport> {
        if options.batch_size == 0 {
            return Err(VaultError::validation("batch size cannot be zero"));
        }
        if !backup_root.is_dir() {
            return Err(VaultError::validation(format!(
                "backup directory not found: {}",
                backup_root.display()
            )));
        }

        let collections = match &options.collections {
            Some(selected) if !selected.is_empty() => selected.clone(),
            _ => {
                let discovered = discover_collections(backup_root)?;
                if discovered.is_empty() {
                    return Err(VaultError::validation(format!(
                        "no restorable collections found in {}",
                        backup_root.display()
                    )));
                }
                info!(
                    "Discovered {} collections in {}",
                    discovered.len(),
                    backup_root.display()
                );
                discovered
            }
        };

        let mut report = RestoreReport::default();
        let total = collections.len();
        for (index, name) in collections.iter().enumerate() {
            info!("Starting restore of collection: {}", name);
            self.progress.emit(ProgressEvent::CollectionStarted {
                collection: name.clone(),
                index,
                total,
            });

            match self
                .restore_collection(database, name, backup_root, options)
                .await
            {
                Ok(outcome) => {
                    info!(
                        "Successfully restored '{}' ({} documents)",
                        name, outcome.documents_inserted
                    );
                    report.record(name, outcome);
                    self.progress.emit(ProgressEvent::CollectionCompleted {
                        collection: name.clone(),
                        documents: outcome.documents_inserted,
                    });
                }
                Err(err) => {
                    error!("Failed to restore collection '{}': {}", name, err);
                    report.record(name, CollectionOutcome::default());
                    self.progress.emit(ProgressEvent::CollectionFailed {
                        collection: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            "Restore completed: {}/{} collections restored successfully",
            report.succeeded().len(),
            report.len()
        );
        self.progress.emit(ProgressEvent::RestoreFinished {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Restore one collection from its stream file
    async fn restore_collection(
        &self,
        database: &str,
        collection: &str,
        backup_root: &Path,
        options: &RestoreOptions,
    ) -> Result<CollectionOutcome> {
        let stream_path = backup_root.join(collection).join(encoded_file_name(collection));
        if !stream_path.is_file() {
            return Err(VaultError::collection_failed(
                collection,
                format!("backup file not found: {}", stream_path.display()),
            ));
        }

        if options.drop_existing {
            info!("Dropping existing collection: {}", collection);
            self.store.drop_collection(database, collection).await?;
        }

        let file = tokio::fs::File::open(&stream_path).await?;
        let mut lines = BufReader::new(file).lines();

        let mut batch: Vec<Document> = Vec::with_capacity(options.batch_size);
        let mut inserted: u64 = 0;
        let mut malformed: u64 = 0;
        let mut line_number: u64 = 0;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match codec::decode(line, line_number) {
                Ok(document) => {
                    batch.push(document);
                    if batch.len() >= options.batch_size {
                        inserted += self.flush_batch(database, collection, &mut batch).await?;
                    }
                }
                Err(err) => {
                    warn!("Skipping record in '{}': {}", collection, err);
                    malformed += 1;
                }
            }
        }

        if !batch.is_empty() {
            inserted += self.flush_batch(database, collection, &mut batch).await?;
        }

        if let Some(final_count) = self
            .store
            .count_documents(database, collection, DEFAULT_COUNT_TIME_BUDGET)
            .await?
        {
            info!(
                "Collection '{}' now holds {} documents",
                collection, final_count
            );
        }

        Ok(CollectionOutcome {
            success: true,
            documents_inserted: inserted,
            malformed_lines: malformed,
        })
    }

    /// Flush one batch with a single bulk insert
    async fn flush_batch(
        &self,
        database: &str,
        collection: &str,
        batch: &mut Vec<Document>,
    ) -> Result<u64> {
        let size = batch.len();
        self.store
            .insert_batch(database, collection, std::mem::take(batch))
            .await?;
        info!("Inserted {} documents into {}", size, collection);
        self.progress.emit(ProgressEvent::BatchInserted {
            collection: collection.to_string(),
            documents: size,
        });
        Ok(size as u64)
    }
}
