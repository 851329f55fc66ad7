/*!
Database gateways for the transfer engines.

This module defines the session abstraction (port) both engines consume and
its concrete implementations (adapters). The engines never talk to a driver
directly: everything they need from a database (liveness, enumeration,
bounded counting, an unfiltered cursor, bulk inserts, drops) goes through
[`DocumentStore`], so a live server and the in-memory test double are
interchangeable.
*/

pub mod memory;
pub mod mongo;

use crate::Result;
use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use std::time::Duration;
use tracing::debug;

/// Stream of documents produced by an unfiltered collection cursor
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// One collection as seen during enumeration
///
/// `count` is `None` when the document count could not be produced within
/// the time budget; enumeration reports unknown instead of hanging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Collection name
    pub name: String,
    /// Approximate document count, when it could be taken in time
    pub count: Option<u64>,
}

/// Session abstraction over a connected database
///
/// Implementations represent an already-established, liveness-verified
/// session. Connection establishment lives on the concrete adapters (e.g.
/// [`mongo::MongoStore::connect`]) because its failure modes are
/// adapter-specific.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// No-op administrative probe verifying the session is usable
    async fn ping(&self) -> Result<()>;

    /// Names of all collections in a database
    async fn collection_names(&self, database: &str) -> Result<Vec<String>>;

    /// Count the documents in a collection within a bounded time budget
    ///
    /// Returns `Ok(None)` when the count cannot be produced inside the
    /// budget; the caller decides how to proceed without a number.
    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        budget: Duration,
    ) -> Result<Option<u64>>;

    /// Open an unfiltered, unsorted cursor over a full collection
    ///
    /// Document order is whatever the source yields and is not stable
    /// across repeated calls.
    async fn open_cursor(&self, database: &str, collection: &str) -> Result<DocumentStream>;

    /// Insert a batch of documents with a single bulk write
    async fn insert_batch(
        &self,
        database: &str,
        collection: &str,
        batch: Vec<Document>,
    ) -> Result<()>;

    /// Drop a collection; succeeds when the collection does not exist
    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()>;

    /// Enumerate collections with their approximate counts
    ///
    /// Each count runs under `budget`; a collection whose count exceeds it
    /// appears with `count: None` rather than stalling the enumeration.
    async fn list_collections(
        &self,
        database: &str,
        budget: Duration,
    ) -> Result<Vec<CollectionInfo>> {
        let names = self.collection_names(database).await?;
        debug!("Enumerating {} collections in '{}'", names.len(), database);

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            let count = self.count_documents(database, &name, budget).await?;
            collections.push(CollectionInfo { name, count });
        }
        Ok(collections)
    }
}

pub use memory::MemoryStore;
pub use mongo::MongoStore;
