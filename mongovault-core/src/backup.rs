/*!
Backup engine: streams collections from a live session into a backup
directory.

One run materializes a timestamp-qualified directory under the caller's
output root, then processes the selected collections in order. Each
collection is streamed document-by-document through the line codec into
`<collection>.json`, holding memory bounded regardless of collection size,
and sealed with a `metadata.json` manifest. A failing collection is logged and
marked failed without aborting the run, and the aggregate
`backup_summary.json` is written unconditionally so every run leaves a
record. The source database is never mutated.
*/

use crate::codec;
use crate::gateway::DocumentStore;
use crate::manifest::{
    backup_dir_name, encoded_file_name, BackupSummary, CollectionManifest, METADATA_FILE,
    SUMMARY_FILE,
};
use crate::progress::{null_sink, ProgressEvent, SharedSink};
use crate::{ConnectionConfig, Result, VaultError};
use chrono::Utc;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info};

/// Engine for backing up collections through a [`DocumentStore`] session
pub struct BackupEngine<S: DocumentStore> {
    store: S,
    source: ConnectionConfig,
    progress: SharedSink,
}

impl<S: DocumentStore> BackupEngine<S> {
    /// Create an engine over an established session
    ///
    /// `source` carries the host/port the session was opened against; the
    /// engine uses it to label the run directory and summary.
    pub fn new(store: S, source: ConnectionConfig) -> Self {
        Self {
            store,
            source,
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

    /// Back up the given collections of `database` under `output_root`
    ///
    /// Collections are processed in caller order. Empty collections are
    /// skipped (logged, not failed); any error while transferring one
    /// collection marks it failed and the run continues. The returned
    /// summary, also written to disk, reflects exactly what succeeded,
    /// what was skipped and what failed.
    pub async fn backup(
        &self,
        database: &str,
        collections: &[String],
        output_root: &Path,
    ) -> Result<BackupSummary> {
        if collections.is_empty() {
            return Err(VaultError::validation(
                "no collections selected for backup",
            ));
        }

        let run_dir = output_root.join(backup_dir_name(
            database,
            &self.source.host_token(),
            Utc::now(),
        ));
        tokio::fs::create_dir_all(&run_dir).await?;
        info!("Backing up into {}", run_dir.display());

        let mut summary = BackupSummary::new(
            database,
            &self.source.host,
            self.source.port,
            collections.to_vec(),
            run_dir.display().to_string(),
        );

        let total = collections.len();
        for (index, name) in collections.iter().enumerate() {
            self.progress.emit(ProgressEvent::CollectionStarted {
                collection: name.clone(),
                index,
                total,
            });

            match self.backup_collection(database, name, &run_dir).await {
                Ok(Some(documents)) => {
                    info!("Successfully backed up {} ({} documents)", name, documents);
                    summary.record_success(name);
                    self.progress.emit(ProgressEvent::CollectionCompleted {
                        collection: name.clone(),
                        documents,
                    });
                }
                Ok(None) => {
                    info!("Collection {} is empty, skipping", name);
                    summary.record_skipped(name);
                    self.progress.emit(ProgressEvent::CollectionSkipped {
                        collection: name.clone(),
                    });
                }
                Err(err) => {
                    error!("Failed to backup {}: {}", name, err);
                    summary.record_failure(name);
                    self.progress.emit(ProgressEvent::CollectionFailed {
                        collection: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        summary.mark_finished();
        tokio::fs::write(run_dir.join(SUMMARY_FILE), summary.to_pretty_json()?).await?;
        info!(
            "Backup completed: {}/{} collections backed up",
            summary.collections_backed_up, summary.total_collections
        );

        self.progress.emit(ProgressEvent::BackupFinished {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Transfer one collection; `Ok(None)` means skipped because empty
    ///
    /// The pre-stream count is only used for the empty check. The manifest
    /// records the number of documents actually streamed, which is the
    /// count a restore of this file will reproduce.
    async fn backup_collection(
        &self,
        database: &str,
        collection: &str,
        run_dir: &Path,
    ) -> Result<Option<u64>> {
        info!("Backing up {}...", collection);

        let count = self
            .store
            .count_documents(database, collection, self.source.count_time_budget)
            .await?;
        if count == Some(0) {
            return Ok(None);
        }

        let collection_dir = run_dir.join(collection);
        tokio::fs::create_dir_all(&collection_dir).await?;

        let stream_path: PathBuf = collection_dir.join(encoded_file_name(collection));
        let file = tokio::fs::File::create(&stream_path).await?;
        let mut writer = BufWriter::new(file);

        let mut cursor = self.store.open_cursor(database, collection).await?;
        let mut written: u64 = 0;
        while let Some(document) = cursor.try_next().await? {
            let line = codec::encode(&document)?;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            written += 1;
        }
        writer.flush().await?;

        let manifest = CollectionManifest::new(collection, database, written);
        tokio::fs::write(collection_dir.join(METADATA_FILE), manifest.to_pretty_json()?).await?;

        Ok(Some(written))
    }
}
