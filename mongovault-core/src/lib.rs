/*!
# Mongovault Core Engine

Type-preserving backup and restore of schema-flexible document collections.

This crate provides the transfer engine for exporting MongoDB collections
into a self-describing, line-delimited Extended JSON format and re-importing
that format into a (possibly different) deployment:

- Line codec with lossless round trips for extended value types (ObjectIds,
  datetimes, integer subtypes, Decimal128, binary blobs)
- Gateway abstraction over the database session with a live MongoDB adapter
  and an in-memory adapter for tests
- Streaming backup with per-collection manifests and an aggregate run summary
- Batched restore with per-line malformed-record tolerance
- Per-collection failure isolation: one bad collection never aborts a run

## Architecture

The engines depend only on the [`gateway::DocumentStore`] port; the MongoDB
driver lives behind the [`gateway::MongoStore`] adapter. Progress flows out
through an advisory [`progress::ProgressSink`], so a front end observes runs
over a channel instead of sharing state with the engine.

## Usage

```rust,no_run
use mongovault_core::{BackupEngine, ConnectionConfig, MongoStore};
use std::path::Path;

# async fn run() -> mongovault_core::Result<()> {
let config = ConnectionConfig::new("10.8.0.2");
let store = MongoStore::connect(&config).await?;

let engine = BackupEngine::new(store, config);
let summary = engine
    .backup("inventory", &["orders".to_string()], Path::new("./backups"))
    .await?;
println!("{}/{} collections backed up", summary.collections_backed_up, summary.total_collections);
# Ok(())
# }
```
*/

pub mod backup;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod manifest;
pub mod progress;
pub mod restore;

pub use backup::BackupEngine;
pub use codec::FORMAT_IDENTIFIER;
pub use config::{ConnectionConfig, Credentials};
pub use error::{Result, VaultError};
pub use gateway::{CollectionInfo, DocumentStore, MemoryStore, MongoStore};
pub use manifest::{BackupSummary, CollectionManifest};
pub use progress::{ChannelSink, NullSink, ProgressEvent, ProgressSink};
pub use restore::{discover_collections, RestoreEngine, RestoreOptions, RestoreReport};
